//! `link` and `provision`: the two halves of deployment.

use crate::error::Result;
use crate::planner::{PlanFlags, Selection};
use crate::result::PackCommandResult;
use crate::verbs::{Context, deploy};

/// Flags shared by the deployment verbs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkOptions {
    /// Report without mutating.
    pub dry_run: bool,
    /// Overwrite divergent user links; bypass sentinel gates.
    pub force: bool,
}

/// Run configuration handlers for the selected packs. No sentinels are read
/// or written.
pub fn link(
    ctx: &Context<'_>,
    packs: &[String],
    options: LinkOptions,
) -> Result<PackCommandResult> {
    deploy(
        ctx,
        "link",
        packs,
        Selection::Configuration,
        PlanFlags {
            force: options.force,
            force_reprovision: false,
        },
        options.dry_run,
    )
}

/// Run code-execution handlers for the selected packs; `force` bypasses the
/// sentinel check.
pub fn provision(
    ctx: &Context<'_>,
    packs: &[String],
    options: LinkOptions,
) -> Result<PackCommandResult> {
    deploy(
        ctx,
        "provision",
        packs,
        Selection::CodeExecution,
        PlanFlags {
            force: options.force,
            force_reprovision: false,
        },
        options.dry_run,
    )
}
