//! `off`, `unlink`, and `deprovision`: undoing deployment.
//!
//! `unlink` removes the configuration handlers' links (user-visible hop
//! first). `deprovision` clears code-execution sentinels so the next
//! provision re-runs. `off` is `unlink` plus an off-state capture; it leaves
//! sentinels in place so turning a pack back on does not re-provision.

use tracing::debug;

use crate::error::Result;
use crate::exec::{ExecOptions, Executor};
use crate::handlers::HandlerCategory;
use crate::op::{OpKind, OpStatus};
use crate::pack;
use crate::planner;
use crate::result::{DisplayPack, PackCommandResult, PackStatus, keys};
use crate::rules;
use crate::store::PackState;
use crate::verbs::Context;

/// Flags for the teardown verbs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OffOptions {
    /// Report without mutating.
    pub dry_run: bool,
}

fn teardown(
    ctx: &Context<'_>,
    verb: &str,
    pack_names: &[String],
    capture_state: bool,
    options: OffOptions,
) -> Result<PackCommandResult> {
    let mut result = PackCommandResult::new(verb, options.dry_run);
    let packs = pack::select(ctx.fsys, &ctx.paths, pack_names)?;
    let store = ctx.store();
    let mut total_cleared = 0usize;

    for pk in &packs {
        if pk.ignored {
            result
                .packs
                .push(DisplayPack::new(&pk.name, PackStatus::Ignored));
            continue;
        }

        let matches = rules::match_pack(ctx.fsys, pk, &ctx.rules)?;
        let plan = planner::plan_teardown(ctx.fsys, &ctx.paths, &ctx.registry, &matches)?;

        let exec_options = ExecOptions {
            dry_run: options.dry_run,
            allow_home_symlinks: true,
            ..ExecOptions::default()
        };
        let report = Executor::new(ctx.fsys, &ctx.paths, ctx.runner, exec_options).apply(plan);

        let mut display = DisplayPack::new(
            &pk.name,
            if report.succeeded() {
                PackStatus::Ok
            } else {
                PackStatus::Error
            },
        );
        if let Some(error) = report.error {
            display.error = Some(error.to_string());
            result.errors.push(error);
            result.packs.push(display);
            continue;
        }

        let mut state = PackState::new(&pk.name);
        for opres in &report.results {
            if opres.op.status != OpStatus::Success {
                continue;
            }
            let OpKind::DeleteFile { path } = &opres.op.kind else {
                continue;
            };
            let item_type = if path.starts_with(ctx.paths.data_dir().join("packs")) {
                "intermediate-link"
            } else {
                "user-link"
            };
            total_cleared += 1;
            state.record_cleared(&opres.op.handler, item_type, &path.to_string_lossy());
        }

        if capture_state && !options.dry_run {
            store.save_off_state(&state)?;
            debug!(pack = %pk.name, "off-state captured");
        }

        result.packs.push(display);
    }

    result.set_count(keys::TOTAL_CLEARED, total_cleared);
    Ok(result)
}

/// Remove configuration-handler links for the selected packs.
pub fn unlink(
    ctx: &Context<'_>,
    packs: &[String],
    options: OffOptions,
) -> Result<PackCommandResult> {
    teardown(ctx, "unlink", packs, false, options)
}

/// Turn packs off: unlink and capture a restorable off-state. Sentinels are
/// left in place.
pub fn off(ctx: &Context<'_>, packs: &[String], options: OffOptions) -> Result<PackCommandResult> {
    teardown(ctx, "off", packs, true, options)
}

/// Clear code-execution sentinels so the next provision re-runs.
pub fn deprovision(
    ctx: &Context<'_>,
    packs: &[String],
    options: OffOptions,
) -> Result<PackCommandResult> {
    let mut result = PackCommandResult::new("deprovision", options.dry_run);
    let packs = pack::select(ctx.fsys, &ctx.paths, packs)?;
    let store = ctx.store();
    let mut total_cleared = 0usize;

    for pk in &packs {
        if pk.ignored {
            result
                .packs
                .push(DisplayPack::new(&pk.name, PackStatus::Ignored));
            continue;
        }

        let matches = rules::match_pack(ctx.fsys, pk, &ctx.rules)?;
        let mut handlers: Vec<String> = matches
            .iter()
            .filter(|m| {
                ctx.registry.category(&m.handler) == Some(HandlerCategory::CodeExecution)
            })
            .map(|m| m.handler.clone())
            .collect();
        handlers.sort();
        handlers.dedup();

        for handler in handlers {
            for name in store.list_handler_sentinels(&pk.name, &handler)? {
                total_cleared += 1;
                if !options.dry_run {
                    store.clear_sentinel(&pk.name, &handler, &name)?;
                }
            }
        }
        result.packs.push(DisplayPack::new(&pk.name, PackStatus::Ok));
    }

    result.set_count(keys::TOTAL_CLEARED, total_cleared);
    Ok(result)
}
