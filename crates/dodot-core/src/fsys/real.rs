//! OS-backed filesystem.

use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::fsys::{DirEntry, FileType, Filesystem, Metadata};

/// [`Filesystem`] implementation over the real OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsFilesystem;

impl OsFilesystem {
    /// Construct the OS filesystem.
    pub fn new() -> Self {
        Self
    }
}

fn convert(meta: &fs::Metadata) -> Metadata {
    let file_type = if meta.file_type().is_symlink() {
        FileType::Symlink
    } else if meta.is_dir() {
        FileType::Dir
    } else {
        FileType::File
    };
    Metadata {
        file_type,
        len: meta.len(),
        mode: meta.permissions().mode() & 0o7777,
    }
}

fn absent_as_none<T>(result: io::Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

impl Filesystem for OsFilesystem {
    fn stat(&self, path: &Path) -> Result<Option<Metadata>> {
        Ok(absent_as_none(fs::metadata(path))?.map(|m| convert(&m)))
    }

    fn lstat(&self, path: &Path) -> Result<Option<Metadata>> {
        Ok(absent_as_none(fs::symlink_metadata(path))?.map(|m| convert(&m)))
    }

    fn read_link(&self, path: &Path) -> Result<PathBuf> {
        Ok(fs::read_link(path)?)
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    fn write_file(&self, path: &Path, content: &[u8], mode: u32) -> Result<()> {
        fs::write(path, content)?;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        Ok(())
    }

    fn symlink(&self, source: &Path, target: &Path) -> Result<()> {
        std::os::unix::fs::symlink(source, target)?;
        Ok(())
    }

    fn mkdir_all(&self, path: &Path, mode: u32) -> Result<()> {
        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir(path)?,
            _ => fs::remove_file(path)?,
        }
        Ok(())
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() && !meta.file_type().is_symlink() => {
                fs::remove_dir_all(path)?;
            }
            _ => fs::remove_file(path)?,
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        // From<io::Error> maps EXDEV to CrossDeviceMove; surface it unchanged.
        fs::rename(from, to)?;
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let file_type = if file_type.is_symlink() {
                FileType::Symlink
            } else if file_type.is_dir() {
                FileType::Dir
            } else {
                FileType::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                file_type,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lstat_distinguishes_symlinks_from_files() {
        let dir = tempdir().unwrap();
        let fsys = OsFilesystem::new();
        let file = dir.path().join("file");
        let link = dir.path().join("link");

        fsys.write_file(&file, b"data", 0o644).unwrap();
        fsys.symlink(&file, &link).unwrap();

        assert_eq!(
            fsys.lstat(&link).unwrap().unwrap().file_type,
            FileType::Symlink
        );
        assert_eq!(fsys.stat(&link).unwrap().unwrap().file_type, FileType::File);
        assert_eq!(fsys.read_link(&link).unwrap(), file);
        assert_eq!(fsys.read_file(&link).unwrap(), b"data");
    }

    #[test]
    fn stat_of_missing_path_is_none() {
        let dir = tempdir().unwrap();
        let fsys = OsFilesystem::new();
        assert!(fsys.stat(&dir.path().join("absent")).unwrap().is_none());
    }

    #[test]
    fn remove_handles_dangling_symlinks() {
        let dir = tempdir().unwrap();
        let fsys = OsFilesystem::new();
        let link = dir.path().join("dangling");
        fsys.symlink(Path::new("/nonexistent"), &link).unwrap();
        assert!(fsys.exists(&link));
        fsys.remove(&link).unwrap();
        assert!(!fsys.exists(&link));
    }
}
