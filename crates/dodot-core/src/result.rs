//! The typed result every verb returns.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Error;
use crate::status::FileState;

/// Recognized metadata keys. The set is closed; renderers may rely on it.
pub mod keys {
    /// Count of files moved into a pack by adopt.
    pub const FILES_ADOPTED: &str = "filesAdopted";
    /// Paths adopted, in order.
    pub const ADOPTED_PATHS: &str = "adoptedPaths";
    /// Count of files created by fill/init.
    pub const FILES_CREATED: &str = "filesCreated";
    /// Paths created, in order.
    pub const CREATED_PATHS: &str = "createdPaths";
    /// Operations applied by a deployment verb.
    pub const TOTAL_DEPLOYED: &str = "totalDeployed";
    /// Artifacts removed by off/unlink.
    pub const TOTAL_CLEARED: &str = "totalCleared";
    /// Handlers that ran at least one operation.
    pub const HANDLERS_RUN: &str = "handlersRun";
    /// Whether add-ignore created the marker.
    pub const IGNORE_CREATED: &str = "ignoreCreated";
    /// Whether the requested artifact already existed.
    pub const ALREADY_EXISTED: &str = "alreadyExisted";
    /// Whether `on` skipped its provision phase.
    pub const NO_PROVISION: &str = "noProvision";
    /// Whether `on` forced its provision phase.
    pub const PROVISION_RERUN: &str = "provisionRerun";
}

/// One file (or directory) of a pack, as shown by status.
#[derive(Debug, Clone)]
pub struct DisplayFile {
    /// Path relative to the pack root.
    pub relative: PathBuf,
    /// Handler the file is routed to.
    pub handler: String,
    /// Derived state.
    pub state: FileState,
    /// Optional annotation (e.g. what is wrong).
    pub note: Option<String>,
}

/// Aggregate state of one pack in a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackStatus {
    /// Everything the verb touched succeeded.
    Ok,
    /// Some operations failed, others applied.
    Partial,
    /// The pack's plan failed.
    Error,
    /// The pack carries the ignore marker.
    Ignored,
    /// The pack is recorded as off.
    Off,
}

/// Per-pack slice of a verb result.
#[derive(Debug, Clone)]
pub struct DisplayPack {
    /// Pack name.
    pub name: String,
    /// Aggregate status.
    pub status: PackStatus,
    /// Per-file detail (populated by status; deployment verbs may leave it
    /// empty).
    pub files: Vec<DisplayFile>,
    /// Error message when status is `Error` or `Partial`.
    pub error: Option<String>,
}

impl DisplayPack {
    /// A pack entry with no per-file detail yet.
    pub fn new(name: &str, status: PackStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            files: Vec::new(),
            error: None,
        }
    }
}

/// The return value of every verb.
#[derive(Debug)]
pub struct PackCommandResult {
    /// Verb name (`link`, `adopt`, ...).
    pub command: String,
    /// When the verb ran.
    pub timestamp: DateTime<Utc>,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Optional one-line summary.
    pub message: Option<String>,
    /// Per-pack display states, in lexical pack order.
    pub packs: Vec<DisplayPack>,
    /// Counts and file lists; keys from [`keys`].
    pub metadata: BTreeMap<String, Value>,
    /// Typed per-pack errors; the verb still returns a populated result.
    pub errors: Vec<Error>,
}

impl PackCommandResult {
    /// Fresh result for a verb.
    pub fn new(command: &str, dry_run: bool) -> Self {
        Self {
            command: command.to_string(),
            timestamp: Utc::now(),
            dry_run,
            message: None,
            packs: Vec::new(),
            metadata: BTreeMap::new(),
            errors: Vec::new(),
        }
    }

    /// Set a numeric metadata value.
    pub fn set_count(&mut self, key: &str, count: usize) {
        self.metadata.insert(key.to_string(), Value::from(count));
    }

    /// Set a boolean metadata value.
    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.metadata.insert(key.to_string(), Value::from(value));
    }

    /// Append to a string-list metadata value.
    pub fn push_item(&mut self, key: &str, item: impl Into<String>) {
        let entry = self
            .metadata
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(Value::from(item.into()));
        }
    }

    /// Whether any pack failed.
    pub fn has_failures(&self) -> bool {
        !self.errors.is_empty()
            || self
                .packs
                .iter()
                .any(|p| matches!(p.status, PackStatus::Error | PackStatus::Partial))
    }
}
