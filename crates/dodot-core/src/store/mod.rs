//! The datastore: handler state under the data directory.
//!
//! Layout:
//!
//! ```text
//! packs/<pack>/<handler>/...           handler-owned state
//! packs/<pack>/<handler>/sentinels/... run-once markers
//! off-state/<pack>.json                state captured on "off"
//! shell/                               shell integration scripts
//! ```
//!
//! Sentinel presence means "this code-execution handler already ran
//! successfully against this content"; the digest lives in the filename, so
//! a changed input simply misses its sentinel.

use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorCode, Result};
use crate::fsys::{FileType, Filesystem};
use crate::paths::Paths;

pub mod offstate;

pub use offstate::{ClearedItem, HandlerState, PackState};

/// Handle over the state tree under the data dir.
#[derive(Clone, Copy)]
pub struct Datastore<'a> {
    fsys: &'a dyn Filesystem,
    paths: &'a Paths,
}

impl std::fmt::Debug for Datastore<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datastore")
            .field("data_dir", &self.paths.data_dir())
            .finish()
    }
}

impl<'a> Datastore<'a> {
    /// Construct a datastore over a filesystem and resolved paths.
    pub fn new(fsys: &'a dyn Filesystem, paths: &'a Paths) -> Self {
        Self { fsys, paths }
    }

    fn sentinel_path(&self, pack: &str, handler: &str, name: &str) -> PathBuf {
        self.paths.sentinel_dir(pack, handler).join(name)
    }

    /// Whether a sentinel with this exact name exists.
    pub fn has_sentinel(&self, pack: &str, handler: &str, name: &str) -> bool {
        self.fsys.exists(&self.sentinel_path(pack, handler, name))
    }

    /// Write a sentinel. Existing sentinels are left untouched.
    pub fn write_sentinel(&self, pack: &str, handler: &str, name: &str) -> Result<()> {
        let path = self.sentinel_path(pack, handler, name);
        if self.fsys.exists(&path) {
            return Ok(());
        }
        self.fsys
            .mkdir_all(&self.paths.sentinel_dir(pack, handler), 0o755)?;
        self.fsys.write_file(&path, b"", 0o644)
    }

    /// Remove one sentinel; removing an absent one is not an error.
    pub fn clear_sentinel(&self, pack: &str, handler: &str, name: &str) -> Result<()> {
        let path = self.sentinel_path(pack, handler, name);
        if self.fsys.exists(&path) {
            self.fsys.remove(&path)?;
        }
        Ok(())
    }

    /// List sentinel names for one handler, sorted.
    pub fn list_handler_sentinels(&self, pack: &str, handler: &str) -> Result<Vec<String>> {
        let dir = self.paths.sentinel_dir(pack, handler);
        if !self.fsys.exists(&dir) {
            return Ok(Vec::new());
        }
        Ok(self
            .fsys
            .read_dir(&dir)?
            .into_iter()
            .filter(|e| e.file_type == FileType::File)
            .map(|e| e.name)
            .collect())
    }

    /// Path of the intermediate link for (pack, handler, basename).
    pub fn intermediate_link(&self, pack: &str, handler: &str, basename: &str) -> PathBuf {
        self.paths.pack_handler_dir(pack, handler).join(basename)
    }

    /// Create (or refresh) an intermediate link pointing at `source`.
    pub fn create_intermediate_link(
        &self,
        pack: &str,
        handler: &str,
        basename: &str,
        source: &Path,
    ) -> Result<PathBuf> {
        let link = self.intermediate_link(pack, handler, basename);
        self.fsys
            .mkdir_all(&self.paths.pack_handler_dir(pack, handler), 0o755)?;
        if let Some(meta) = self.fsys.lstat(&link)? {
            if !meta.is_symlink() {
                return Err(Error::new(
                    ErrorCode::Internal,
                    format!("datastore entry is not a symlink: {}", link.display()),
                ));
            }
            if self.fsys.read_link(&link)? == source {
                return Ok(link);
            }
            self.fsys.remove(&link)?;
        }
        self.fsys.symlink(source, &link)?;
        Ok(link)
    }

    /// Delete an intermediate link; absent links are fine.
    pub fn delete_intermediate_link(
        &self,
        pack: &str,
        handler: &str,
        basename: &str,
    ) -> Result<()> {
        let link = self.intermediate_link(pack, handler, basename);
        if self.fsys.exists(&link) {
            self.fsys.remove(&link)?;
        }
        Ok(())
    }

    fn off_state_path(&self, pack: &str) -> PathBuf {
        self.paths.off_state_dir().join(format!("{pack}.json"))
    }

    /// Persist the state captured while turning a pack off.
    pub fn save_off_state(&self, state: &PackState) -> Result<()> {
        self.fsys.mkdir_all(&self.paths.off_state_dir(), 0o755)?;
        let json = serde_json::to_vec_pretty(state).map_err(|err| {
            Error::new(
                ErrorCode::Internal,
                format!("failed to serialize off-state: {err}"),
            )
        })?;
        self.fsys
            .write_file(&self.off_state_path(&state.pack_name), &json, 0o644)
    }

    /// Load a pack's off-state, or `None` when the pack was never turned off.
    pub fn load_off_state(&self, pack: &str) -> Result<Option<PackState>> {
        let path = self.off_state_path(pack);
        if !self.fsys.exists(&path) {
            return Ok(None);
        }
        let raw = self.fsys.read_file(&path)?;
        let state = serde_json::from_slice(&raw).map_err(|err| {
            Error::new(
                ErrorCode::FileAccess,
                format!("corrupt off-state for {pack:?}: {err}"),
            )
        })?;
        Ok(Some(state))
    }

    /// Remove a pack's off-state record, if any.
    pub fn clear_off_state(&self, pack: &str) -> Result<()> {
        let path = self.off_state_path(pack);
        if self.fsys.exists(&path) {
            self.fsys.remove(&path)?;
        }
        Ok(())
    }

    /// Whether the pack is currently recorded as off.
    pub fn is_off(&self, pack: &str) -> bool {
        self.fsys.exists(&self.off_state_path(pack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsys::MemoryFilesystem;
    use crate::paths::Environment;

    fn setup() -> (MemoryFilesystem, Paths) {
        let fsys = MemoryFilesystem::new();
        fsys.mkdir_all(Path::new("/data"), 0o755).unwrap();
        fsys.mkdir_all(Path::new("/dots/git"), 0o755).unwrap();
        let paths = Paths::resolve(Environment {
            home: Some("/home/t".into()),
            dotfiles_root: Some("/dots".into()),
            data_dir: Some("/data".into()),
            ..Environment::default()
        })
        .unwrap();
        (fsys, paths)
    }

    #[test]
    fn sentinel_lifecycle() {
        let (fsys, paths) = setup();
        let store = Datastore::new(&fsys, &paths);

        assert!(!store.has_sentinel("tools", "install", "install.sh-abc"));
        store.write_sentinel("tools", "install", "install.sh-abc").unwrap();
        assert!(store.has_sentinel("tools", "install", "install.sh-abc"));
        // Re-writing is a no-op.
        store.write_sentinel("tools", "install", "install.sh-abc").unwrap();
        assert_eq!(
            store.list_handler_sentinels("tools", "install").unwrap(),
            ["install.sh-abc"]
        );

        store.clear_sentinel("tools", "install", "install.sh-abc").unwrap();
        assert!(!store.has_sentinel("tools", "install", "install.sh-abc"));
        // Clearing twice is fine.
        store.clear_sentinel("tools", "install", "install.sh-abc").unwrap();
    }

    #[test]
    fn intermediate_links_point_at_sources() {
        let (fsys, paths) = setup();
        fsys.write_file(Path::new("/dots/git/gitconfig"), b"[user]", 0o644)
            .unwrap();
        let store = Datastore::new(&fsys, &paths);

        let link = store
            .create_intermediate_link("git", "symlink", "gitconfig", Path::new("/dots/git/gitconfig"))
            .unwrap();
        assert_eq!(link, Path::new("/data/packs/git/symlink/gitconfig"));
        assert_eq!(
            fsys.read_link(&link).unwrap(),
            Path::new("/dots/git/gitconfig")
        );

        // Re-pointing replaces the referent.
        fsys.write_file(Path::new("/dots/git/other"), b"x", 0o644).unwrap();
        store
            .create_intermediate_link("git", "symlink", "gitconfig", Path::new("/dots/git/other"))
            .unwrap();
        assert_eq!(fsys.read_link(&link).unwrap(), Path::new("/dots/git/other"));

        store.delete_intermediate_link("git", "symlink", "gitconfig").unwrap();
        assert!(!fsys.exists(&link));
    }

    #[test]
    fn off_state_round_trips() {
        let (fsys, paths) = setup();
        let store = Datastore::new(&fsys, &paths);

        assert!(!store.is_off("tools"));
        let mut state = PackState::new("tools");
        state.record_cleared("symlink", "user-link", "/home/t/.gitconfig");
        store.save_off_state(&state).unwrap();

        assert!(store.is_off("tools"));
        let loaded = store.load_off_state("tools").unwrap().unwrap();
        assert_eq!(loaded.pack_name, "tools");
        assert_eq!(loaded.version, "1");
        assert_eq!(loaded.handlers["symlink"].cleared_items[0].path, "/home/t/.gitconfig");

        store.clear_off_state("tools").unwrap();
        assert!(!store.is_off("tools"));
    }
}
