//! The path handler: expose a pack's `bin/` directory on `$PATH`.
//!
//! The whole directory is intermediated by one directory symlink under the
//! datastore; the shell init script prepends every such directory to `$PATH`.

use crate::error::Result;
use crate::handlers::{Handler, HandlerCategory, basename};
use crate::op::{OpKind, Operation};
use crate::paths::Paths;
use crate::rules::RuleMatch;

/// Intermediates executable directories for the init script to pick up.
#[derive(Debug, Clone, Copy)]
pub struct PathDirs;

impl Handler for PathDirs {
    fn name(&self) -> &'static str {
        "path"
    }

    fn category(&self) -> HandlerCategory {
        HandlerCategory::Configuration
    }

    fn plan(&self, matched: &RuleMatch, paths: &Paths) -> Result<Vec<Operation>> {
        let name = basename(matched)?;
        let handler_dir = paths.pack_handler_dir(&matched.pack, self.name());

        let ops = vec![
            Operation::new(OpKind::CreateDirectory {
                path: handler_dir.clone(),
                mode: 0o755,
            }),
            Operation::new(OpKind::CreateSymlink {
                source: matched.absolute.clone(),
                target: handler_dir.join(&name),
            })
            .describe(format!(
                "expose {}/{} on PATH",
                matched.pack,
                matched.relative.display()
            )),
        ];

        Ok(ops
            .into_iter()
            .map(|op| op.attribute(&matched.pack, self.name()))
            .collect())
    }
}
