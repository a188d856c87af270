//! `fill`, `init`, and `add-ignore`: the verbs that write into the
//! dotfiles root.

use crate::error::{Error, ErrorCode, Result};
use crate::pack::{self, CONFIG_FILE, IGNORE_MARKER};
use crate::result::{DisplayPack, PackCommandResult, PackStatus, keys};
use crate::verbs::Context;

const TEMPLATE_ALIASES: &str = "\
# Sourced on every new shell once this pack is on.
# alias g='git'
";

const TEMPLATE_INSTALL: &str = "\
#!/bin/sh
# Runs once per content change when this pack is provisioned.
# $DODOT_PACK is the pack name, $DODOT_PACK_DIR its directory.
set -e
";

const TEMPLATE_BREWFILE: &str = "\
# Installed with `brew bundle` when this pack is provisioned.
# brew \"jq\"
";

const TEMPLATE_CONFIG: &str = "\
# Per-pack dodot configuration. Everything is optional.
#
# Extra glob patterns to skip during rule matching:
# ignore = [\"*.bak\"]
#
# Handlers never applied to this pack:
# disable = [\"homebrew\"]
";

const TEMPLATE_README: &str = "\
# {pack}

Files in this pack are deployed by dodot:

- plain files are symlinked into your home or XDG config tree
- `*.sh` files are sourced on shell startup
- `bin/` is added to your PATH
- `install.sh` and `Brewfile` run once when you provision
";

/// Write the handler templates a pack is missing: `aliases.sh`,
/// `install.sh`, `Brewfile`, and an empty `bin/`.
pub fn fill(ctx: &Context<'_>, pack_name: &str) -> Result<PackCommandResult> {
    let mut result = PackCommandResult::new("fill", false);
    let pk = pack::find(ctx.fsys, &ctx.paths, pack_name)?;
    let created = fill_pack(ctx, &pk.dir)?;

    for path in &created {
        result.push_item(keys::CREATED_PATHS, path.clone());
    }
    result.set_count(keys::FILES_CREATED, created.len());
    result.packs.push(DisplayPack::new(&pk.name, PackStatus::Ok));
    Ok(result)
}

fn fill_pack(ctx: &Context<'_>, dir: &std::path::Path) -> Result<Vec<String>> {
    let mut created = Vec::new();
    let templates: [(&str, &str, u32); 3] = [
        ("aliases.sh", TEMPLATE_ALIASES, 0o644),
        ("install.sh", TEMPLATE_INSTALL, 0o755),
        ("Brewfile", TEMPLATE_BREWFILE, 0o644),
    ];
    for (name, content, mode) in templates {
        let path = dir.join(name);
        if !ctx.fsys.exists(&path) {
            ctx.fsys.write_file(&path, content.as_bytes(), mode)?;
            created.push(path.to_string_lossy().into_owned());
        }
    }
    let bin = dir.join("bin");
    if !ctx.fsys.exists(&bin) {
        ctx.fsys.mkdir_all(&bin, 0o755)?;
        created.push(bin.to_string_lossy().into_owned());
    }
    Ok(created)
}

/// Create a new pack: directory, commented-out config skeleton, README,
/// then fill.
pub fn init(ctx: &Context<'_>, pack_name: &str) -> Result<PackCommandResult> {
    pack::validate_name(pack_name)?;
    let dir = ctx.paths.pack_dir(pack_name);
    if ctx.fsys.exists(&dir) {
        return Err(Error::new(
            ErrorCode::AlreadyExists,
            format!("pack {pack_name:?} already exists at {}", dir.display()),
        ));
    }

    let mut result = PackCommandResult::new("init", false);
    ctx.fsys.mkdir_all(&dir, 0o755)?;
    let mut created = vec![dir.to_string_lossy().into_owned()];

    let config = dir.join(CONFIG_FILE);
    ctx.fsys
        .write_file(&config, TEMPLATE_CONFIG.as_bytes(), 0o644)?;
    created.push(config.to_string_lossy().into_owned());

    let readme = dir.join("README.md");
    let content = TEMPLATE_README.replace("{pack}", pack_name);
    ctx.fsys.write_file(&readme, content.as_bytes(), 0o644)?;
    created.push(readme.to_string_lossy().into_owned());

    created.extend(fill_pack(ctx, &dir)?);

    for path in &created {
        result.push_item(keys::CREATED_PATHS, path.clone());
    }
    result.set_count(keys::FILES_CREATED, created.len());
    result
        .packs
        .push(DisplayPack::new(pack_name, PackStatus::Ok));
    Ok(result)
}

/// Create the ignore marker in a pack. Idempotent.
pub fn add_ignore(ctx: &Context<'_>, pack_name: &str) -> Result<PackCommandResult> {
    let mut result = PackCommandResult::new("add-ignore", false);
    let pk = pack::find(ctx.fsys, &ctx.paths, pack_name)?;

    let marker = pk.dir.join(IGNORE_MARKER);
    if ctx.fsys.exists(&marker) {
        result.set_flag(keys::IGNORE_CREATED, false);
        result.set_flag(keys::ALREADY_EXISTED, true);
    } else {
        ctx.fsys.write_file(&marker, b"", 0o644)?;
        result.set_flag(keys::IGNORE_CREATED, true);
    }
    result
        .packs
        .push(DisplayPack::new(&pk.name, PackStatus::Ignored));
    Ok(result)
}
