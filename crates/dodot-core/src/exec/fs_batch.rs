//! Batch filesystem engine.
//!
//! Resolves intra-batch dependencies (parent directories before children,
//! intermediate symlinks before the user links pointing at them), applies
//! the batch in order, and on first failure reverses every completed
//! operation in reverse order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use crate::error::{Error, ErrorCode, Result};
use crate::fsys::Filesystem;
use crate::op::{OpKind, OpResult, OpStatus, Operation};

/// How to undo one completed operation.
#[derive(Debug)]
enum Undo {
    /// Remove an entry this batch created.
    RemovePath(PathBuf),
    /// Remove directories this batch created, deepest first.
    RemoveDirs(Vec<PathBuf>),
    /// Put back a file this batch overwrote or deleted.
    RestoreFile {
        path: PathBuf,
        content: Vec<u8>,
        mode: u32,
    },
    /// Put back a symlink this batch deleted.
    RestoreSymlink { path: PathBuf, referent: PathBuf },
    /// Nothing to undo (no-op operation).
    Nothing,
}

/// Applies filesystem-setup buckets.
pub struct FsBatch<'a> {
    fsys: &'a dyn Filesystem,
    rollback: bool,
}

impl std::fmt::Debug for FsBatch<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsBatch")
            .field("rollback", &self.rollback)
            .finish()
    }
}

fn kind_rank(op: &Operation) -> u8 {
    match op.kind {
        OpKind::CreateDirectory { .. } => 0,
        OpKind::DeleteFile { .. } => 1,
        OpKind::WriteFile { .. } | OpKind::CopyFile { .. } => 2,
        OpKind::CreateSymlink { .. } => 3,
        OpKind::Execute { .. } => 4,
    }
}

/// Order a batch: directories (shallow first), deletes, file writes, then
/// symlinks sorted so that a link is created before any link pointing at it.
fn order_batch(ops: Vec<Operation>) -> Vec<Operation> {
    let mut ordered: Vec<Operation> = Vec::with_capacity(ops.len());
    let mut symlinks: Vec<Operation> = Vec::new();

    let mut rest: Vec<Operation> = ops;
    rest.sort_by_key(|op| {
        (
            kind_rank(op),
            op.target_path().map_or(0, |p| p.components().count()),
        )
    });
    for op in rest {
        if matches!(op.kind, OpKind::CreateSymlink { .. }) {
            symlinks.push(op);
        } else {
            ordered.push(op);
        }
    }

    // Kahn-style pass over the symlinks: emit links whose source is not
    // itself created later in this batch.
    let mut emitted: HashSet<PathBuf> = HashSet::new();
    while !symlinks.is_empty() {
        let pending_targets: HashSet<PathBuf> = symlinks
            .iter()
            .filter_map(|op| op.target_path().map(Path::to_path_buf))
            .collect();
        let position = symlinks.iter().position(|op| {
            let OpKind::CreateSymlink { source, .. } = &op.kind else {
                return true;
            };
            emitted.contains(source) || !pending_targets.contains(source)
        });
        match position {
            Some(index) => {
                let op = symlinks.remove(index);
                if let Some(target) = op.target_path() {
                    emitted.insert(target.to_path_buf());
                }
                ordered.push(op);
            }
            None => {
                // Cycle between links; fall back to declaration order.
                ordered.append(&mut symlinks);
            }
        }
    }

    ordered
}

impl<'a> FsBatch<'a> {
    /// Engine over a filesystem; `rollback` reverses on first failure.
    pub fn new(fsys: &'a dyn Filesystem, rollback: bool) -> Self {
        Self { fsys, rollback }
    }

    /// Apply a batch.
    ///
    /// On failure with rollback enabled, completed operations are reversed
    /// in reverse order and the aggregate error is returned.
    pub fn run(&self, ops: Vec<Operation>) -> Result<Vec<OpResult>> {
        let ordered = order_batch(ops);
        let mut results = Vec::with_capacity(ordered.len());
        let mut journal: Vec<Undo> = Vec::new();

        for op in ordered {
            debug!(kind = ?op.kind, pack = %op.pack, "applying");
            match self.apply(&op) {
                Ok(undo) => {
                    journal.push(undo);
                    results.push(OpResult::finished(op, OpStatus::Success));
                }
                Err(err) => {
                    error!(%err, pack = %op.pack, "filesystem operation failed");
                    if self.rollback {
                        self.unwind(journal);
                    }
                    return Err(Error::new(
                        ErrorCode::ActionExecute,
                        format!("filesystem setup failed for pack {:?}", op.pack),
                    )
                    .caused_by(err));
                }
            }
        }

        Ok(results)
    }

    fn apply(&self, op: &Operation) -> Result<Undo> {
        match &op.kind {
            OpKind::CreateDirectory { path, mode } => {
                let mut created = Vec::new();
                let mut ancestors: Vec<&Path> = path.ancestors().collect();
                ancestors.reverse();
                for ancestor in ancestors {
                    if !ancestor.as_os_str().is_empty() && !self.fsys.exists(ancestor) {
                        created.push(ancestor.to_path_buf());
                    }
                }
                self.fsys.mkdir_all(path, *mode)?;
                created.reverse();
                Ok(Undo::RemoveDirs(created))
            }
            OpKind::WriteFile {
                path,
                content,
                mode,
            } => {
                let undo = self.save_entry(path)?;
                self.fsys.write_file(path, content, *mode)?;
                Ok(undo)
            }
            OpKind::CopyFile { source, target } => {
                let undo = self.save_entry(target)?;
                let content = self.fsys.read_file(source)?;
                let mode = self
                    .fsys
                    .stat(source)?
                    .map_or(0o644, |meta| meta.mode);
                self.fsys.write_file(target, &content, mode)?;
                Ok(undo)
            }
            OpKind::CreateSymlink { source, target } => {
                match self.fsys.lstat(target)? {
                    None => {
                        self.fsys.symlink(source, target)?;
                        Ok(Undo::RemovePath(target.clone()))
                    }
                    Some(meta) if meta.is_symlink() && self.fsys.read_link(target)? == *source => {
                        // Already the link we want.
                        Ok(Undo::Nothing)
                    }
                    Some(_) => Err(Error::new(
                        ErrorCode::SymlinkExists,
                        format!("refusing to overwrite {}", target.display()),
                    )),
                }
            }
            OpKind::DeleteFile { path } => {
                let undo = self.save_entry(path)?;
                self.fsys.remove(path)?;
                Ok(undo)
            }
            OpKind::Execute { .. } => Err(Error::new(
                ErrorCode::Internal,
                "execute operation reached the filesystem engine",
            )),
        }
    }

    /// Capture what exists at `path` so rollback can put it back.
    fn save_entry(&self, path: &Path) -> Result<Undo> {
        match self.fsys.lstat(path)? {
            None => Ok(Undo::RemovePath(path.to_path_buf())),
            Some(meta) if meta.is_symlink() => Ok(Undo::RestoreSymlink {
                path: path.to_path_buf(),
                referent: self.fsys.read_link(path)?,
            }),
            Some(meta) if meta.is_dir() => Err(Error::new(
                ErrorCode::FileAccess,
                format!("is a directory: {}", path.display()),
            )),
            Some(meta) => Ok(Undo::RestoreFile {
                path: path.to_path_buf(),
                content: self.fsys.read_file(path)?,
                mode: meta.mode,
            }),
        }
    }

    fn unwind(&self, journal: Vec<Undo>) {
        for undo in journal.into_iter().rev() {
            let outcome = match undo {
                Undo::Nothing => Ok(()),
                Undo::RemovePath(path) => {
                    if self.fsys.exists(&path) {
                        self.fsys.remove(&path)
                    } else {
                        Ok(())
                    }
                }
                Undo::RemoveDirs(dirs) => dirs
                    .into_iter()
                    .try_for_each(|dir| self.fsys.remove(&dir)),
                Undo::RestoreFile {
                    path,
                    content,
                    mode,
                } => {
                    let _ = self.fsys.remove(&path);
                    self.fsys.write_file(&path, &content, mode)
                }
                Undo::RestoreSymlink { path, referent } => {
                    let _ = self.fsys.remove(&path);
                    self.fsys.symlink(&referent, &path)
                }
            };
            if let Err(err) = outcome {
                // Best effort; the aggregate error already reports the cause.
                error!(%err, "rollback step failed");
            }
        }
    }
}
