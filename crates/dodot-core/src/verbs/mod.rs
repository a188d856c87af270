//! Verb layer: thin compositions of discovery, rules, planner, and executor.
//!
//! Every verb returns a populated [`PackCommandResult`]; per-pack failures
//! are typed errors collected on the result, and only invocation-level
//! problems (unknown pack, unresolvable home) surface as `Err`.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Error, Result};
use crate::exec::{CommandRunner, ExecOptions, Executor};
use crate::fsys::Filesystem;
use crate::handlers::HandlerRegistry;
use crate::op::OpStatus;
use crate::pack::{self, Pack};
use crate::paths::Paths;
use crate::planner::{self, Plan, PlanFlags, Selection};
use crate::result::{DisplayPack, PackCommandResult, PackStatus, keys};
use crate::rules::{self, Rule};
use crate::store::Datastore;

pub mod adopt;
pub mod fill;
pub mod link;
pub mod off;
pub mod on;
pub mod status;

#[cfg(test)]
pub(crate) mod testutil;

pub use adopt::{AdoptOptions, adopt};
pub use fill::{add_ignore, fill, init};
pub use link::{LinkOptions, link, provision};
pub use off::{OffOptions, deprovision, off, unlink};
pub use on::{OnOptions, on};
pub use status::status;

/// Process-scoped state built once at invocation entry and passed into
/// every verb.
pub struct Context<'a> {
    /// Filesystem implementation.
    pub fsys: &'a dyn Filesystem,
    /// Resolved well-known directories.
    pub paths: Paths,
    /// Command runner for execute operations.
    pub runner: &'a dyn CommandRunner,
    /// Handler registry.
    pub registry: HandlerRegistry,
    /// Rule set, highest priority first.
    pub rules: Vec<Rule>,
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("paths", &self.paths)
            .field("registry", &self.registry)
            .finish()
    }
}

impl<'a> Context<'a> {
    /// Context with the default handlers and rules.
    pub fn new(fsys: &'a dyn Filesystem, paths: Paths, runner: &'a dyn CommandRunner) -> Self {
        Self {
            fsys,
            paths,
            runner,
            registry: HandlerRegistry::with_defaults(),
            rules: rules::default_rules(),
        }
    }

    /// Datastore over this context's filesystem and paths.
    pub fn store(&self) -> Datastore<'_> {
        Datastore::new(self.fsys, &self.paths)
    }
}

/// Shared deployment flow for link/provision/on.
pub(crate) fn deploy(
    ctx: &Context<'_>,
    verb: &str,
    pack_names: &[String],
    selection: Selection,
    flags: PlanFlags,
    dry_run: bool,
) -> Result<PackCommandResult> {
    let mut result = PackCommandResult::new(verb, dry_run);
    let packs = pack::select(ctx.fsys, &ctx.paths, pack_names)?;
    let store = ctx.store();

    let mut handlers_run: BTreeSet<String> = BTreeSet::new();
    let mut total_deployed = 0usize;

    for pk in &packs {
        if pk.ignored {
            result
                .packs
                .push(DisplayPack::new(&pk.name, PackStatus::Ignored));
            continue;
        }
        match deploy_pack(ctx, &store, pk, selection, flags, dry_run) {
            Ok(outcome) => {
                total_deployed += outcome.deployed;
                handlers_run.extend(outcome.handlers);
                let mut display = DisplayPack::new(&pk.name, outcome.status);
                if let Some(error) = outcome.error {
                    display.error = Some(error.to_string());
                    result.errors.push(error);
                }
                result.packs.push(display);
            }
            Err(error) => {
                debug!(pack = %pk.name, %error, "pack plan failed");
                let mut display = DisplayPack::new(&pk.name, PackStatus::Error);
                display.error = Some(error.to_string());
                result.packs.push(display);
                result.errors.push(error);
            }
        }
    }

    result.set_count(keys::TOTAL_DEPLOYED, total_deployed);
    for handler in handlers_run {
        result.push_item(keys::HANDLERS_RUN, handler);
    }
    Ok(result)
}

struct PackOutcome {
    status: PackStatus,
    deployed: usize,
    handlers: BTreeSet<String>,
    error: Option<Error>,
}

fn deploy_pack(
    ctx: &Context<'_>,
    store: &Datastore<'_>,
    pk: &Pack,
    selection: Selection,
    flags: PlanFlags,
    dry_run: bool,
) -> Result<PackOutcome> {
    let matches = rules::match_pack(ctx.fsys, pk, &ctx.rules)?;
    let plan = planner::plan_pack(
        ctx.fsys,
        &ctx.paths,
        &ctx.registry,
        store,
        &matches,
        selection,
        flags,
    )?;

    let mut error: Option<Error> = plan
        .failures
        .into_iter()
        .next()
        .map(|failure| failure.error);

    let options = ExecOptions {
        dry_run,
        allow_home_symlinks: true,
        ..ExecOptions::default()
    };
    let report = Executor::new(ctx.fsys, &ctx.paths, ctx.runner, options).apply(Plan {
        setup: plan.setup,
        commands: plan.commands,
        post: plan.post,
        skipped: plan.skipped,
        failures: Vec::new(),
    });

    let deployed = report.count(OpStatus::Success);
    let handlers: BTreeSet<String> = report
        .results
        .iter()
        .filter(|r| r.op.status == OpStatus::Success)
        .map(|r| r.op.handler.clone())
        .collect();

    let status = match (&report.error, deployed) {
        (None, _) if error.is_none() => PackStatus::Ok,
        (None, _) => PackStatus::Partial,
        (Some(_), 0) => PackStatus::Error,
        (Some(_), _) => PackStatus::Partial,
    };
    if error.is_none() {
        error = report.error;
    }

    Ok(PackOutcome {
        status,
        deployed,
        handlers,
        error,
    })
}
