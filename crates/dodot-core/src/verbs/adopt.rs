//! `adopt`: move an existing user file into a pack and link it back.
//!
//! The destination inside the pack is the inverse of the symlink handler's
//! mapping, so a later `link` run reproduces exactly the link adopt leaves
//! behind. Renames never cross devices; the error surfaces unchanged.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Error, ErrorCode, Result};
use crate::exec::{ExecOptions, Executor};
use crate::handlers::{Handler, Symlink};
use crate::pack::{self, Pack};
use crate::planner::Plan;
use crate::result::{DisplayPack, PackCommandResult, PackStatus, keys};
use crate::rules::RuleMatch;
use crate::verbs::Context;

/// Flags for `adopt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdoptOptions {
    /// Overwrite an existing destination inside the pack.
    pub force: bool,
}

/// Move `files` into `pack_name` and create the user-visible links back.
///
/// Already-adopted files (symlinks into the dotfiles root or data dir) are
/// no-ops. Writing into the dotfiles root is this verb's privilege; the
/// deployment verbs never do.
pub fn adopt(
    ctx: &Context<'_>,
    pack_name: &str,
    files: &[PathBuf],
    options: AdoptOptions,
) -> Result<PackCommandResult> {
    let mut result = PackCommandResult::new("adopt", false);
    let pk = pack::find(ctx.fsys, &ctx.paths, pack_name)?;

    let mut adopted = 0usize;
    let mut display = DisplayPack::new(&pk.name, PackStatus::Ok);

    for file in files {
        match adopt_one(ctx, &pk, file, options) {
            Ok(Some(dest)) => {
                adopted += 1;
                result.push_item(keys::ADOPTED_PATHS, file.to_string_lossy());
                info!(file = %file.display(), dest = %dest.display(), "adopted");
            }
            Ok(None) => {
                // Already a link into dodot territory.
                result.set_flag(keys::ALREADY_EXISTED, true);
            }
            Err(error) => {
                display.status = PackStatus::Partial;
                display.error = Some(error.to_string());
                result.errors.push(error);
            }
        }
    }

    if display.status == PackStatus::Partial && adopted == 0 {
        display.status = PackStatus::Error;
    }
    result.set_count(keys::FILES_ADOPTED, adopted);
    result.packs.push(display);
    Ok(result)
}

fn adopt_one(
    ctx: &Context<'_>,
    pk: &Pack,
    file: &Path,
    options: AdoptOptions,
) -> Result<Option<PathBuf>> {
    if !file.is_absolute() {
        return Err(Error::new(
            ErrorCode::InvalidInput,
            format!("adopt needs an absolute path, got {}", file.display()),
        ));
    }
    let meta = ctx.fsys.lstat(file)?.ok_or_else(|| {
        Error::new(
            ErrorCode::NotFound,
            format!("no such file: {}", file.display()),
        )
    })?;

    if meta.is_symlink() {
        let referent = ctx.fsys.read_link(file)?;
        if referent.starts_with(ctx.paths.dotfiles_root())
            || referent.starts_with(ctx.paths.data_dir())
        {
            return Ok(None);
        }
        return Err(Error::new(
            ErrorCode::InvalidInput,
            format!("{} is a symlink to foreign territory", file.display()),
        ));
    }
    if meta.is_dir() {
        return Err(Error::new(
            ErrorCode::InvalidInput,
            format!("adopt takes files, not directories: {}", file.display()),
        ));
    }

    let relative = ctx.paths.pack_relative_for(file).ok_or_else(|| {
        Error::new(
            ErrorCode::InvalidInput,
            format!(
                "{} is outside the home and XDG config trees",
                file.display()
            ),
        )
    })?;

    let dest = pk.dir.join(&relative);
    if ctx.fsys.exists(&dest) && !options.force {
        return Err(Error::new(
            ErrorCode::AlreadyExists,
            format!("{} already exists in pack {:?}", dest.display(), pk.name),
        ));
    }

    if let Some(parent) = dest.parent() {
        ctx.fsys.mkdir_all(parent, 0o755)?;
    }
    if options.force && ctx.fsys.exists(&dest) {
        ctx.fsys.remove(&dest)?;
    }
    // Same-device rename; a cross-device failure surfaces unchanged.
    ctx.fsys.rename(file, &dest)?;

    // Recreate the user location as the two-hop chain link would.
    let matched = RuleMatch {
        pack: pk.name.clone(),
        relative,
        absolute: dest.clone(),
        handler: "symlink".to_string(),
        priority: 0,
        rule_order: 0,
        is_dir: false,
        options: Default::default(),
        digest: None,
    };
    let ops = Symlink.plan(&matched, &ctx.paths)?;
    let exec_options = ExecOptions {
        allow_home_symlinks: true,
        ..ExecOptions::default()
    };
    let report = Executor::new(ctx.fsys, &ctx.paths, ctx.runner, exec_options).apply(Plan {
        setup: ops,
        ..Plan::default()
    });
    if let Some(error) = report.error {
        return Err(error);
    }
    Ok(Some(dest))
}
