//! Typed errors with stable codes.
//!
//! Every fallible operation in the core returns [`Error`]. The code is the
//! stable contract: callers (and tests) match on [`ErrorCode`], never on
//! message text. Wrapping preserves the code chain so a caller can ask
//! "is this a `PackNotFound` anywhere down the chain?" via [`Error::has_code`].

use std::collections::BTreeMap;
use std::fmt;

/// Stable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed user input (bad pack name, bad flag combination).
    InvalidInput,
    /// A referenced entity does not exist.
    NotFound,
    /// Refusing to overwrite an existing entity.
    AlreadyExists,
    /// An operation touched a path outside the safe directory set.
    PermissionDenied,
    /// Named pack has no directory under the dotfiles root.
    PackNotFound,
    /// Pack exists but its name or configuration is invalid.
    PackInvalid,
    /// A handler rejected its input while emitting operations.
    HandlerExecute,
    /// Two planned writes to the same target disagree on content.
    ActionConflict,
    /// An operation failed during execution.
    ActionExecute,
    /// A user-visible symlink target already exists.
    SymlinkExists,
    /// Filesystem access failed.
    FileAccess,
    /// Rename across devices is not supported.
    CrossDeviceMove,
    /// Home directory could not be determined.
    PathUnresolvable,
    /// Reserved surface that is intentionally not implemented.
    NotImplemented,
    /// Invariant violation; a bug in dodot, not in user input.
    Internal,
}

impl ErrorCode {
    /// The stable string form, as printed in brackets on stderr.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "InvalidInput",
            Self::NotFound => "NotFound",
            Self::AlreadyExists => "AlreadyExists",
            Self::PermissionDenied => "PermissionDenied",
            Self::PackNotFound => "PackNotFound",
            Self::PackInvalid => "PackInvalid",
            Self::HandlerExecute => "HandlerExecute",
            Self::ActionConflict => "ActionConflict",
            Self::ActionExecute => "ActionExecute",
            Self::SymlinkExists => "SymlinkExists",
            Self::FileAccess => "FileAccess",
            Self::CrossDeviceMove => "CrossDeviceMove",
            Self::PathUnresolvable => "PathUnresolvable",
            Self::NotImplemented => "NotImplemented",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dodot error: stable code, message, open-ended details, optional cause.
#[derive(Debug, thiserror::Error)]
#[error("[{code}] {message}")]
pub struct Error {
    code: ErrorCode,
    message: String,
    details: BTreeMap<String, String>,
    #[source]
    cause: Option<Box<Error>>,
}

impl Error {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: BTreeMap::new(),
            cause: None,
        }
    }

    /// Attach a key/value detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    /// Wrap a lower-level error as the cause, preserving its code chain.
    pub fn caused_by(mut self, cause: Error) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The code of this error (not of its causes).
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The details bag.
    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    /// Walk the cause chain looking for `code`.
    pub fn has_code(&self, code: ErrorCode) -> bool {
        let mut current = Some(self);
        while let Some(err) = current {
            if err.code == code {
                return true;
            }
            current = err.cause.as_deref();
        }
        false
    }

    /// The full chain, outermost first, for verbose rendering.
    pub fn chain(&self) -> impl Iterator<Item = &Error> {
        std::iter::successors(Some(self), |err| err.cause.as_deref())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let code = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => ErrorCode::AlreadyExists,
            _ if err.raw_os_error() == Some(libc::EXDEV) => ErrorCode::CrossDeviceMove,
            _ => ErrorCode::FileAccess,
        };
        Self::new(code, err.to_string())
    }
}

/// Convenience alias used throughout the core.
pub type Result<T, E = Error> = std::result::Result<T, E>;
