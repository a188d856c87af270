//! Executor: applies a plan's three buckets.
//!
//! Filesystem setup goes through the batch engine (ordering + rollback),
//! commands run serially through a [`CommandRunner`], and post-command
//! sentinel writes land only for groups whose command succeeded. Safety
//! rules are checked for the whole plan before the first mutation.

use std::collections::HashSet;
use std::path::Path;

use chrono::Utc;
use tracing::info;

use crate::error::{Error, ErrorCode, Result};
use crate::fsys::Filesystem;
use crate::op::{OpKind, OpResult, OpStatus, Operation};
use crate::paths::Paths;
use crate::planner::Plan;

pub mod command;
pub mod fs_batch;

pub use command::{CommandRunner, CommandSpec, DEFAULT_TIMEOUT, ProcessRunner, RecordingRunner};
pub use fs_batch::FsBatch;

/// Knobs of one executor run.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Report what would happen without mutating anything.
    pub dry_run: bool,
    /// Permit user-visible symlink targets under the home tree.
    pub allow_home_symlinks: bool,
    /// Reverse completed setup operations on first failure.
    pub rollback: bool,
    /// Home-relative prefixes never written, even with home symlinks allowed.
    pub protected: Vec<String>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            allow_home_symlinks: false,
            rollback: true,
            protected: vec![".ssh".to_string(), ".gnupg".to_string()],
        }
    }
}

/// What one executor run did.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Per-operation outcomes, including skipped operations.
    pub results: Vec<OpResult>,
    /// Aggregate error, when any bucket failed.
    pub error: Option<Error>,
}

impl ExecutionReport {
    /// Whether every applied operation succeeded.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Count of operations with the given status.
    pub fn count(&self, status: OpStatus) -> usize {
        self.results.iter().filter(|r| r.op.status == status).count()
    }
}

/// Applies plans to a filesystem and a command runner.
pub struct Executor<'a> {
    fsys: &'a dyn Filesystem,
    paths: &'a Paths,
    runner: &'a dyn CommandRunner,
    options: ExecOptions,
}

impl std::fmt::Debug for Executor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("options", &self.options)
            .finish()
    }
}

impl<'a> Executor<'a> {
    /// Construct an executor.
    pub fn new(
        fsys: &'a dyn Filesystem,
        paths: &'a Paths,
        runner: &'a dyn CommandRunner,
        options: ExecOptions,
    ) -> Self {
        Self {
            fsys,
            paths,
            runner,
            options,
        }
    }

    /// Apply one pack's plan.
    pub fn apply(&self, plan: Plan) -> ExecutionReport {
        let mut report = ExecutionReport::default();

        if let Err(err) = self.check_plan(&plan) {
            report.error = Some(err);
            return report;
        }

        if self.options.dry_run {
            let now = Utc::now();
            for op in plan
                .setup
                .into_iter()
                .chain(plan.commands)
                .chain(plan.post)
            {
                report.results.push(OpResult {
                    op,
                    error: None,
                    started_at: now,
                    finished_at: now,
                });
            }
            Self::append_skipped(&mut report, plan.skipped);
            return report;
        }

        // Bucket 1: filesystem setup, atomic per batch.
        match FsBatch::new(self.fsys, self.options.rollback).run(plan.setup) {
            Ok(results) => report.results.extend(results),
            Err(err) => {
                report.error = Some(err);
                Self::append_skipped(&mut report, plan.skipped);
                return report;
            }
        }

        // Bucket 2: commands, serial, one child at a time.
        let mut failed_groups: HashSet<(String, String)> = HashSet::new();
        for op in plan.commands {
            let started_at = Utc::now();
            let outcome = CommandSpec::from_op(&op.kind).and_then(|spec| {
                info!(command = %spec.command, pack = %op.pack, "running");
                self.runner.run(&spec)
            });
            let finished_at = Utc::now();
            match outcome {
                Ok(()) => {
                    let mut op = op;
                    op.status = OpStatus::Success;
                    report.results.push(OpResult {
                        op,
                        error: None,
                        started_at,
                        finished_at,
                    });
                }
                Err(err) => {
                    failed_groups.insert((op.pack.clone(), op.handler.clone()));
                    let mut op = op;
                    op.status = OpStatus::Error;
                    report.results.push(OpResult {
                        op,
                        error: Some(err.to_string()),
                        started_at,
                        finished_at,
                    });
                    report.error = Some(
                        Error::new(ErrorCode::ActionExecute, "a provisioning command failed")
                            .caused_by(err),
                    );
                }
            }
        }

        // Bucket 3: sentinels, only where the owning command succeeded, and
        // never triggering rollback of the earlier buckets.
        for op in plan.post {
            if failed_groups.contains(&(op.pack.clone(), op.handler.clone())) {
                report.results.push(OpResult::finished(op, OpStatus::Skipped));
                continue;
            }
            match FsBatch::new(self.fsys, false).run(vec![op]) {
                Ok(results) => report.results.extend(results),
                Err(err) => {
                    if report.error.is_none() {
                        report.error = Some(err);
                    }
                }
            }
        }

        Self::append_skipped(&mut report, plan.skipped);
        report
    }

    fn append_skipped(report: &mut ExecutionReport, skipped: Vec<Operation>) {
        for op in skipped {
            report.results.push(OpResult::finished(op, OpStatus::Skipped));
        }
    }

    fn check_plan(&self, plan: &Plan) -> Result<()> {
        for op in plan.setup.iter().chain(plan.post.iter()) {
            if let Some(target) = op.target_path() {
                self.check_target(target)?;
            }
            if let OpKind::CreateSymlink { source, .. } = &op.kind {
                self.check_symlink_source(source)?;
            }
        }
        Ok(())
    }

    /// Every mutated path must lie in the safe directory set.
    fn check_target(&self, path: &Path) -> Result<()> {
        if path.starts_with(self.paths.data_dir()) {
            return Ok(());
        }
        let under_home =
            path.starts_with(self.paths.home()) || path.starts_with(self.paths.config_home());
        if self.options.allow_home_symlinks && under_home {
            for prefix in &self.options.protected {
                if path.starts_with(self.paths.home().join(prefix)) {
                    return Err(Error::new(
                        ErrorCode::PermissionDenied,
                        format!("{} is a protected path", path.display()),
                    ));
                }
            }
            return Ok(());
        }
        Err(Error::new(
            ErrorCode::PermissionDenied,
            format!("{} is outside the safe directory set", path.display()),
        ))
    }

    /// Symlink referents must live in the dotfiles root or the data dir.
    fn check_symlink_source(&self, source: &Path) -> Result<()> {
        if source.starts_with(self.paths.dotfiles_root())
            || source.starts_with(self.paths.data_dir())
        {
            Ok(())
        } else {
            Err(Error::new(
                ErrorCode::PermissionDenied,
                format!(
                    "symlink source {} is outside the dotfiles root and data dir",
                    source.display()
                ),
            ))
        }
    }
}
