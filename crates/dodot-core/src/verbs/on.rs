//! `on`: full deployment of a pack.
//!
//! Links and provisions in one plan, installs the shell integration files
//! after success, and clears any off-state so the pack reads as on again.

use crate::error::{Error, ErrorCode, Result};
use crate::planner::{PlanFlags, Selection};
use crate::result::{PackCommandResult, PackStatus, keys};
use crate::shell;
use crate::verbs::{Context, deploy};

/// Flags for `on`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnOptions {
    /// Report without mutating.
    pub dry_run: bool,
    /// Overwrite divergent user links; bypass sentinel gates.
    pub force: bool,
    /// Skip the provision phase entirely.
    pub no_provision: bool,
    /// Force the provision phase even when sentinels match.
    pub provision_rerun: bool,
}

/// Turn packs on: link, then provision (unless `no_provision`), then install
/// the shell integration.
pub fn on(ctx: &Context<'_>, packs: &[String], options: OnOptions) -> Result<PackCommandResult> {
    if options.no_provision && options.provision_rerun {
        return Err(Error::new(
            ErrorCode::InvalidInput,
            "no-provision and provision-rerun are mutually exclusive",
        ));
    }

    let selection = if options.no_provision {
        Selection::Configuration
    } else {
        Selection::All
    };
    let flags = PlanFlags {
        force: options.force,
        force_reprovision: options.provision_rerun,
    };

    let mut result = deploy(ctx, "on", packs, selection, flags, options.dry_run)?;
    result.set_flag(keys::NO_PROVISION, options.no_provision);
    result.set_flag(keys::PROVISION_RERUN, options.provision_rerun);

    if options.dry_run || result.has_failures() {
        return Ok(result);
    }

    shell::install(ctx.fsys, &ctx.paths)?;
    let store = ctx.store();
    for pack in &result.packs {
        if pack.status == PackStatus::Ok {
            store.clear_off_state(&pack.name)?;
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsys::Filesystem;
    use crate::verbs::off::{OffOptions, off};
    use crate::verbs::testutil::Harness;
    use std::path::Path;

    #[test]
    fn on_links_provisions_and_installs_shell_integration() {
        let harness = Harness::new();
        harness.add_pack_file("git", "gitconfig", b"[user]");
        harness.add_pack_file("git", "aliases.sh", b"alias g=git\n");
        harness.add_pack_file("tools", "install.sh", b"#!/bin/sh\n");
        let ctx = harness.ctx();

        let result = on(&ctx, &[], OnOptions::default()).unwrap();
        assert!(!result.has_failures());

        assert!(harness.fsys.exists(Path::new("/home/t/.gitconfig")));
        assert!(
            harness
                .fsys
                .exists(Path::new("/data/shell/profile.d/aliases.sh"))
        );
        assert!(harness.fsys.exists(Path::new("/data/shell/dodot-init.sh")));
        assert_eq!(harness.runner.calls().len(), 1);
    }

    #[test]
    fn off_then_on_restores_without_reprovisioning() {
        let harness = Harness::new();
        harness.add_pack_file("tools", "install.sh", b"#!/bin/sh\n");
        harness.add_pack_file("tools", "toolrc", b"setting=1");
        let ctx = harness.ctx();

        on(&ctx, &[], OnOptions::default()).unwrap();
        assert_eq!(harness.runner.calls().len(), 1);

        off(&ctx, &[], OffOptions::default()).unwrap();
        assert!(!harness.fsys.exists(Path::new("/home/t/.toolrc")));
        assert!(ctx.store().is_off("tools"));

        // Links come back; the matching sentinel keeps the script gated.
        on(&ctx, &[], OnOptions::default()).unwrap();
        assert!(harness.fsys.exists(Path::new("/home/t/.toolrc")));
        assert_eq!(harness.runner.calls().len(), 1);
        assert!(!ctx.store().is_off("tools"));
    }

    #[test]
    fn no_provision_skips_scripts() {
        let harness = Harness::new();
        harness.add_pack_file("tools", "install.sh", b"#!/bin/sh\n");
        harness.add_pack_file("tools", "toolrc", b"x");
        let ctx = harness.ctx();

        let options = OnOptions {
            no_provision: true,
            ..OnOptions::default()
        };
        let result = on(&ctx, &[], options).unwrap();
        assert!(!result.has_failures());
        assert_eq!(result.metadata[keys::NO_PROVISION], true);
        assert!(harness.runner.calls().is_empty());
        assert!(harness.fsys.exists(Path::new("/home/t/.toolrc")));
    }

    #[test]
    fn provision_rerun_bypasses_sentinels() {
        let harness = Harness::new();
        harness.add_pack_file("tools", "install.sh", b"#!/bin/sh\n");
        let ctx = harness.ctx();

        on(&ctx, &[], OnOptions::default()).unwrap();
        let options = OnOptions {
            provision_rerun: true,
            ..OnOptions::default()
        };
        on(&ctx, &[], options).unwrap();
        assert_eq!(harness.runner.calls().len(), 2);
    }

    #[test]
    fn conflicting_flags_are_invalid_input() {
        let harness = Harness::new();
        let options = OnOptions {
            no_provision: true,
            provision_rerun: true,
            ..OnOptions::default()
        };
        let err = on(&harness.ctx(), &[], options).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn on_dry_run_touches_nothing() {
        let harness = Harness::new();
        harness.add_pack_file("git", "gitconfig", b"[user]");
        let ctx = harness.ctx();

        let before = harness.fsys.snapshot();
        let options = OnOptions {
            dry_run: true,
            ..OnOptions::default()
        };
        on(&ctx, &[], options).unwrap();
        assert_eq!(before, harness.fsys.snapshot());
    }
}
