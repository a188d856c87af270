//! The homebrew handler: `brew bundle` against a pack's Brewfile.
//!
//! brew is opaque to dodot; the handler stages the Brewfile, shells out,
//! and records a digest-keyed sentinel on success. The `brew` executable is
//! resolved at plan time: a machine without it fails this handler, and only
//! this handler.

use std::path::PathBuf;

use crate::digest::homebrew_sentinel_name;
use crate::error::{Error, ErrorCode, Result};
use crate::handlers::{Handler, HandlerCategory, basename, require_digest, timeout_option};
use crate::op::{OpKind, Operation};
use crate::paths::Paths;
use crate::rules::RuleMatch;

fn which_brew(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Installs a pack's Brewfile bundle once per content.
#[derive(Debug, Clone, Copy)]
pub struct Homebrew {
    resolver: fn(&str) -> Option<PathBuf>,
}

impl Homebrew {
    /// Handler resolving `brew` on the caller's PATH.
    pub fn new() -> Self {
        Self {
            resolver: which_brew,
        }
    }

    /// Handler with a fixed resolver (for tests).
    pub fn with_resolver(resolver: fn(&str) -> Option<PathBuf>) -> Self {
        Self { resolver }
    }
}

impl Default for Homebrew {
    fn default() -> Self {
        Self::new()
    }
}

impl Handler for Homebrew {
    fn name(&self) -> &'static str {
        "homebrew"
    }

    fn category(&self) -> HandlerCategory {
        HandlerCategory::CodeExecution
    }

    fn plan(&self, matched: &RuleMatch, paths: &Paths) -> Result<Vec<Operation>> {
        let brew = (self.resolver)("brew").ok_or_else(|| {
            Error::new(
                ErrorCode::HandlerExecute,
                format!(
                    "brew not found on PATH; cannot bundle {} for pack {:?}",
                    matched.relative.display(),
                    matched.pack
                ),
            )
            .with_detail("pack", &matched.pack)
        })?;

        let name = basename(matched)?;
        let digest = require_digest(matched)?;
        let timeout_secs = timeout_option(&matched.options)?;

        let handler_dir = paths.pack_handler_dir(&matched.pack, self.name());
        let brewfile_copy = handler_dir.join(&name);
        let sentinel = paths
            .sentinel_dir(&matched.pack, self.name())
            .join(homebrew_sentinel_name(&matched.pack, &name, digest));

        let ops = vec![
            Operation::new(OpKind::CreateDirectory {
                path: handler_dir.clone(),
                mode: 0o755,
            }),
            Operation::new(OpKind::CreateDirectory {
                path: paths.sentinel_dir(&matched.pack, self.name()),
                mode: 0o755,
            }),
            Operation::new(OpKind::CopyFile {
                source: matched.absolute.clone(),
                target: brewfile_copy.clone(),
            })
            .describe(format!("stage {} in the datastore", name)),
            Operation::new(OpKind::Execute {
                command: brew.to_string_lossy().into_owned(),
                args: vec![
                    "bundle".to_string(),
                    format!("--file={}", brewfile_copy.display()),
                ],
                working_dir: Some(handler_dir),
                env: vec![],
                timeout_secs,
            })
            .describe(format!("brew bundle for pack {}", matched.pack)),
            Operation::new(OpKind::WriteFile {
                path: sentinel,
                content: Vec::new(),
                mode: 0o644,
            })
            .describe(format!("mark {} as bundled", name)),
        ];

        Ok(ops
            .into_iter()
            .map(|op| op.attribute(&matched.pack, self.name()))
            .collect())
    }
}
