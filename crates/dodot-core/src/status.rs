//! Per-file status state machine.
//!
//! States are derived, never stored: the link chain and the sentinel
//! directory are the only sources of truth.

use std::fmt;

use crate::digest::sha256_hex;
use crate::error::Result;
use crate::fsys::Filesystem;
use crate::handlers::{Handler, HandlerCategory, HandlerRegistry};
use crate::op::OpKind;
use crate::paths::Paths;
use crate::rules::RuleMatch;
use crate::store::Datastore;

/// Derived state of one pack file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Deployed correctly (links in place, or sentinel matches content).
    Ready,
    /// Never deployed, or cleared.
    Missing,
    /// Content changed since the last run; re-run needed (code-execution).
    Pending,
    /// Structural mismatch: wrong referent, occupied target, lost source.
    Error,
    /// The pack carries the ignore marker.
    Ignored,
    /// The pack configuration file itself.
    Config,
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Ready => "ready",
            Self::Missing => "missing",
            Self::Pending => "pending",
            Self::Error => "error",
            Self::Ignored => "ignored",
            Self::Config => "config",
        };
        f.write_str(label)
    }
}

fn config_handler_state(
    fsys: &dyn Filesystem,
    paths: &Paths,
    registry: &HandlerRegistry,
    matched: &RuleMatch,
) -> Result<FileState> {
    let Some(handler) = registry.get(&matched.handler) else {
        return Ok(FileState::Error);
    };
    let Ok(ops) = handler.plan(matched, paths) else {
        return Ok(FileState::Error);
    };

    let mut all_correct = true;
    let mut any_present = false;
    for op in &ops {
        let OpKind::CreateSymlink { source, target } = &op.kind else {
            continue;
        };
        match fsys.lstat(target)? {
            None => all_correct = false,
            Some(meta) if meta.is_symlink() => {
                if fsys.read_link(target)? == *source {
                    any_present = true;
                } else {
                    return Ok(FileState::Error);
                }
            }
            Some(_) => return Ok(FileState::Error),
        }
    }

    if all_correct {
        Ok(FileState::Ready)
    } else if any_present {
        // Half a chain is a structural mismatch, not a clean absence.
        Ok(FileState::Error)
    } else {
        Ok(FileState::Missing)
    }
}

fn code_handler_state(
    fsys: &dyn Filesystem,
    store: &Datastore<'_>,
    matched: &RuleMatch,
) -> Result<FileState> {
    let digest = match &matched.digest {
        Some(digest) => digest.clone(),
        None => sha256_hex(&fsys.read_file(&matched.absolute)?),
    };

    let sentinels = store.list_handler_sentinels(&matched.pack, &matched.handler)?;
    let suffix = format!("-{digest}");
    if sentinels.iter().any(|name| name.ends_with(&suffix)) {
        return Ok(FileState::Ready);
    }

    // A sentinel for the same basename with a different digest means the
    // input changed since the last successful run.
    let basename = matched
        .relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stale = sentinels
        .iter()
        .any(|name| name.contains(basename.as_str()));
    if stale {
        Ok(FileState::Pending)
    } else {
        Ok(FileState::Missing)
    }
}

/// Derive the state of one matched pack entry.
pub fn file_state(
    fsys: &dyn Filesystem,
    paths: &Paths,
    registry: &HandlerRegistry,
    store: &Datastore<'_>,
    matched: &RuleMatch,
) -> Result<FileState> {
    if !fsys.exists(&matched.absolute) {
        return Ok(FileState::Error);
    }
    match registry.category(&matched.handler) {
        Some(HandlerCategory::Configuration) => {
            config_handler_state(fsys, paths, registry, matched)
        }
        Some(HandlerCategory::CodeExecution) => code_handler_state(fsys, store, matched),
        None => Ok(FileState::Error),
    }
}
