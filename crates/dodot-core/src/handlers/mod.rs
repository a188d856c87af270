//! Handlers: named logic that turns a matched file into operations.
//!
//! Handlers never touch the filesystem; they only emit [`Operation`] values.
//! Configuration handlers are idempotent and safe to re-run. Code-execution
//! handlers are run-once, gated by a sentinel keyed on the input's digest.

use std::collections::BTreeMap;

use crate::error::{Error, ErrorCode, Result};
use crate::op::Operation;
use crate::paths::Paths;
use crate::rules::RuleMatch;

pub mod homebrew;
pub mod install;
pub mod path;
pub mod shell;
pub mod symlink;

pub use homebrew::Homebrew;
pub use install::Install;
pub use path::PathDirs;
pub use shell::Shell;
pub use symlink::Symlink;

/// What re-running a handler means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerCategory {
    /// Idempotent; re-applied on every invocation.
    Configuration,
    /// Run-once per input content, gated by a sentinel.
    CodeExecution,
}

/// One named handler.
pub trait Handler: Send + Sync {
    /// Registry name; rules route to this.
    fn name(&self) -> &'static str;

    /// Whether this handler configures or executes code.
    fn category(&self) -> HandlerCategory;

    /// Emit the operations deploying one matched entry.
    fn plan(&self, matched: &RuleMatch, paths: &Paths) -> Result<Vec<Operation>>;
}

/// Process-scoped handler registry, built once at invocation entry.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn Handler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.handlers.iter().map(|h| h.name()))
            .finish()
    }
}

impl HandlerRegistry {
    /// Registry with the built-in handler set.
    pub fn with_defaults() -> Self {
        Self {
            handlers: vec![
                Box::new(Symlink),
                Box::new(Shell),
                Box::new(PathDirs),
                Box::new(Install),
                Box::new(Homebrew::new()),
            ],
        }
    }

    /// Register an additional handler. On a name collision the earlier
    /// registration wins.
    pub fn register(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(handler);
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Option<&dyn Handler> {
        self.handlers
            .iter()
            .find(|h| h.name() == name)
            .map(AsRef::as_ref)
    }

    /// Category of a named handler, if registered.
    pub fn category(&self, name: &str) -> Option<HandlerCategory> {
        self.get(name).map(Handler::category)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Basename of a match as a string, or `HandlerExecute` for pathless input.
pub(crate) fn basename(matched: &RuleMatch) -> Result<String> {
    matched
        .relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            Error::new(
                ErrorCode::HandlerExecute,
                format!("match has no file name: {}", matched.relative.display()),
            )
        })
}

/// Digest required by code-execution handlers.
pub(crate) fn require_digest(matched: &RuleMatch) -> Result<&str> {
    matched.digest.as_deref().ok_or_else(|| {
        Error::new(
            ErrorCode::Internal,
            format!(
                "no content digest for {}; planner must fill it before code-execution handlers",
                matched.relative.display()
            ),
        )
    })
}

/// Parse an optional `timeout` (seconds) handler option.
pub(crate) fn timeout_option(options: &BTreeMap<String, String>) -> Result<Option<u64>> {
    match options.get("timeout") {
        None => Ok(None),
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            Error::new(
                ErrorCode::InvalidInput,
                format!("invalid timeout option: {raw:?}"),
            )
        }),
    }
}
