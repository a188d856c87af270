//! Operation values.
//!
//! Handlers emit these; the planner orders and de-duplicates them; the
//! executor is the only place they turn into side effects.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::digest::sha256_hex;

/// One side effect, as data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
    /// Create a directory (and parents are a separate op or pre-existing).
    CreateDirectory {
        /// Directory to create.
        path: PathBuf,
        /// Permission bits.
        mode: u32,
    },
    /// Write a file with the given content.
    WriteFile {
        /// Destination path.
        path: PathBuf,
        /// File content.
        content: Vec<u8>,
        /// Permission bits.
        mode: u32,
    },
    /// Create a symlink at `target` whose referent is `source`.
    CreateSymlink {
        /// Referent the link points to.
        source: PathBuf,
        /// The link name being created.
        target: PathBuf,
    },
    /// Copy a file.
    CopyFile {
        /// File to copy.
        source: PathBuf,
        /// Destination path.
        target: PathBuf,
    },
    /// Delete a file or symlink.
    DeleteFile {
        /// Path to delete.
        path: PathBuf,
    },
    /// Run a child process.
    Execute {
        /// Program to run.
        command: String,
        /// Arguments.
        args: Vec<String>,
        /// Working directory; inherits the parent's when `None`.
        working_dir: Option<PathBuf>,
        /// Extra environment pairs on top of the inherited environment.
        env: Vec<(String, String)>,
        /// Timeout override in seconds; the executor default applies when `None`.
        timeout_secs: Option<u64>,
    },
}

/// Lifecycle of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpStatus {
    /// Planned, not yet applied.
    #[default]
    Ready,
    /// Deliberately not applied (sentinel gate or end-state already met).
    Skipped,
    /// Applied and failed.
    Error,
    /// Applied successfully.
    Success,
}

/// An operation with attribution and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// What to do.
    pub kind: OpKind,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Ordering hint within a handler's output.
    pub priority: i32,
    /// Producing pack.
    pub pack: String,
    /// Producing handler.
    pub handler: String,
    /// Current status.
    pub status: OpStatus,
}

impl Operation {
    /// Wrap a kind with default attribution.
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            description: None,
            priority: 0,
            pack: String::new(),
            handler: String::new(),
            status: OpStatus::Ready,
        }
    }

    /// Attach a description.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Stamp the producing pack and handler.
    pub fn attribute(mut self, pack: &str, handler: &str) -> Self {
        self.pack = pack.to_string();
        self.handler = handler.to_string();
        self
    }

    /// The path this operation mutates, if any.
    pub fn target_path(&self) -> Option<&Path> {
        match &self.kind {
            OpKind::CreateDirectory { path, .. }
            | OpKind::WriteFile { path, .. }
            | OpKind::DeleteFile { path } => Some(path),
            OpKind::CreateSymlink { target, .. } | OpKind::CopyFile { target, .. } => Some(target),
            OpKind::Execute { .. } => None,
        }
    }

    /// Identity for de-duplication: (type, target, source, content digest).
    ///
    /// Two operations with equal identity are the same work; two with the
    /// same type and target but different identity are a conflict.
    pub fn identity(&self) -> OpIdentity {
        match &self.kind {
            OpKind::CreateDirectory { path, .. } => OpIdentity {
                kind: "create-directory",
                target: path.clone(),
                source: None,
                digest: None,
            },
            OpKind::WriteFile { path, content, .. } => OpIdentity {
                kind: "write-file",
                target: path.clone(),
                source: None,
                digest: Some(sha256_hex(content)),
            },
            OpKind::CreateSymlink { source, target } => OpIdentity {
                kind: "create-symlink",
                target: target.clone(),
                source: Some(source.clone()),
                digest: None,
            },
            OpKind::CopyFile { source, target } => OpIdentity {
                kind: "copy-file",
                target: target.clone(),
                source: Some(source.clone()),
                digest: None,
            },
            OpKind::DeleteFile { path } => OpIdentity {
                kind: "delete-file",
                target: path.clone(),
                source: None,
                digest: None,
            },
            OpKind::Execute { command, args, .. } => OpIdentity {
                kind: "execute",
                target: PathBuf::from(command),
                source: Some(PathBuf::from(args.join("\u{1f}"))),
                digest: None,
            },
        }
    }
}

/// De-duplication key of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpIdentity {
    /// Operation type tag.
    pub kind: &'static str,
    /// Mutated path (or command for executes).
    pub target: PathBuf,
    /// Source path, when the type has one.
    pub source: Option<PathBuf>,
    /// Content digest for writes.
    pub digest: Option<String>,
}

impl OpIdentity {
    /// Key identifying the mutated location regardless of content.
    pub fn location(&self) -> (&'static str, &Path) {
        (self.kind, &self.target)
    }
}

/// Outcome of one executed (or skipped) operation.
#[derive(Debug, Clone)]
pub struct OpResult {
    /// The operation, with its final status.
    pub op: Operation,
    /// Error message when status is `Error`.
    pub error: Option<String>,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub finished_at: DateTime<Utc>,
}

impl OpResult {
    /// Wrap an operation with a final status and "now" timestamps.
    pub fn finished(mut op: Operation, status: OpStatus) -> Self {
        op.status = status;
        let now = Utc::now();
        Self {
            op,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// Wrap a failed operation.
    pub fn failed(mut op: Operation, error: impl Into<String>) -> Self {
        op.status = OpStatus::Error;
        let now = Utc::now();
        Self {
            op,
            error: Some(error.into()),
            started_at: now,
            finished_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_writes_share_identity() {
        let a = Operation::new(OpKind::WriteFile {
            path: "/d/f".into(),
            content: b"x".to_vec(),
            mode: 0o644,
        });
        let b = a.clone().attribute("other", "other");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn divergent_writes_to_one_target_differ_only_in_digest() {
        let a = Operation::new(OpKind::WriteFile {
            path: "/d/f".into(),
            content: b"x".to_vec(),
            mode: 0o644,
        });
        let b = Operation::new(OpKind::WriteFile {
            path: "/d/f".into(),
            content: b"y".to_vec(),
            mode: 0o644,
        });
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a.identity().location(), b.identity().location());
    }
}
