//! Pack discovery and per-pack configuration.
//!
//! A pack is one directory under the dotfiles root. Its name is always the
//! directory basename; an ignore marker at the pack root excludes it from
//! every handler while keeping it visible to `status`.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, ErrorCode, Result};
use crate::fsys::{FileType, Filesystem};
use crate::paths::Paths;

/// Marker file excluding a pack from processing.
pub const IGNORE_MARKER: &str = ".dodotignore";
/// Optional per-pack configuration filename.
pub const CONFIG_FILE: &str = ".dodot.toml";

/// Per-pack configuration loaded from [`CONFIG_FILE`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackConfig {
    /// Additional glob patterns skipped during rule matching.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Handler names never applied to this pack.
    #[serde(default)]
    pub disable: Vec<String>,
}

/// A named pack under the dotfiles root.
#[derive(Debug, Clone)]
pub struct Pack {
    /// Pack name; equals the directory basename.
    pub name: String,
    /// Absolute path of the pack directory.
    pub dir: PathBuf,
    /// Parsed configuration (default when absent).
    pub config: PackConfig,
    /// Whether the ignore marker is present.
    pub ignored: bool,
}

/// Validate a pack name: filename-safe, no separator, colon, `..`, or
/// leading dot.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| {
        Err(Error::new(
            ErrorCode::PackInvalid,
            format!("invalid pack name {name:?}: {reason}"),
        ))
    };
    if name.is_empty() {
        return invalid("empty");
    }
    if name.starts_with('.') {
        return invalid("leading dot");
    }
    if name == ".." || name.contains("..") {
        return invalid("path traversal");
    }
    if name.contains('/') || name.contains(':') {
        return invalid("separator character");
    }
    Ok(())
}

fn load(fsys: &dyn Filesystem, paths: &Paths, name: &str) -> Result<Pack> {
    let dir = paths.pack_dir(name);
    let config_path = dir.join(CONFIG_FILE);
    let config = if fsys.exists(&config_path) {
        let raw = fsys.read_file(&config_path)?;
        let text = String::from_utf8(raw).map_err(|err| {
            Error::new(
                ErrorCode::PackInvalid,
                format!("{}: config is not UTF-8: {err}", name),
            )
        })?;
        toml::from_str(&text).map_err(|err| {
            Error::new(
                ErrorCode::PackInvalid,
                format!("{name}: invalid {CONFIG_FILE}: {err}"),
            )
        })?
    } else {
        PackConfig::default()
    };

    Ok(Pack {
        name: name.to_string(),
        dir: dir.clone(),
        config,
        ignored: fsys.exists(&dir.join(IGNORE_MARKER)),
    })
}

/// Enumerate all packs under the dotfiles root, in lexical order.
///
/// A missing dotfiles root yields an empty list. Hidden directories are
/// never packs.
pub fn discover(fsys: &dyn Filesystem, paths: &Paths) -> Result<Vec<Pack>> {
    let root = paths.dotfiles_root();
    if !fsys.exists(root) {
        return Ok(Vec::new());
    }
    let mut packs = Vec::new();
    for entry in fsys.read_dir(root)? {
        if entry.file_type != FileType::Dir || validate_name(&entry.name).is_err() {
            continue;
        }
        packs.push(load(fsys, paths, &entry.name)?);
    }
    Ok(packs)
}

/// Find one pack by name.
///
/// # Errors
///
/// `PackInvalid` for a malformed name, `PackNotFound` when the directory
/// does not exist.
pub fn find(fsys: &dyn Filesystem, paths: &Paths, name: &str) -> Result<Pack> {
    validate_name(name)?;
    let dir = paths.pack_dir(name);
    match fsys.lstat(&dir)? {
        Some(meta) if meta.is_dir() => load(fsys, paths, name),
        _ => Err(Error::new(
            ErrorCode::PackNotFound,
            format!("no pack named {name:?} under {}", paths.dotfiles_root().display()),
        )
        .with_detail("pack", name)),
    }
}

/// Resolve a pack selection: explicit names, or every pack when empty.
pub fn select(fsys: &dyn Filesystem, paths: &Paths, names: &[String]) -> Result<Vec<Pack>> {
    if names.is_empty() {
        return discover(fsys, paths);
    }
    let mut packs: Vec<Pack> = names
        .iter()
        .map(|name| find(fsys, paths, name))
        .collect::<Result<_>>()?;
    packs.sort_by(|a, b| a.name.cmp(&b.name));
    packs.dedup_by(|a, b| a.name == b.name);
    Ok(packs)
}
