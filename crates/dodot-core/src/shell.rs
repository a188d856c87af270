//! Shell integration scripts installed under `<data>/shell/`.
//!
//! The init script is the runtime half of the shell and path handlers: it
//! sources every deployed snippet in `profile.d/` and prepends every
//! path-handler directory to `$PATH`. Users opt in with one line in their
//! shell rc.

use std::path::PathBuf;

use crate::error::Result;
use crate::fsys::Filesystem;
use crate::paths::Paths;

/// POSIX init script filename.
pub const INIT_SCRIPT: &str = "dodot-init.sh";
/// Fish init script filename.
pub const INIT_FISH_SCRIPT: &str = "dodot-init.fish";

const INIT_SH: &str = r#"# dodot shell integration. Source this from your shell rc:
#   . "${DODOT_DATA_DIR:-$HOME/.local/share/dodot}/shell/dodot-init.sh"

DODOT_DATA_DIR="${DODOT_DATA_DIR:-$HOME/.local/share/dodot}"

for _dodot_dir in "$DODOT_DATA_DIR"/packs/*/path/*; do
    [ -d "$_dodot_dir" ] && PATH="$_dodot_dir:$PATH"
done

for _dodot_snippet in "$DODOT_DATA_DIR"/shell/profile.d/*.sh; do
    [ -r "$_dodot_snippet" ] && . "$_dodot_snippet"
done

unset _dodot_dir _dodot_snippet
export PATH
"#;

const INIT_FISH: &str = r#"# dodot shell integration for fish. Source this from config.fish:
#   source (set -q DODOT_DATA_DIR; and echo $DODOT_DATA_DIR; or echo ~/.local/share/dodot)/shell/dodot-init.fish

set -q DODOT_DATA_DIR; or set -l DODOT_DATA_DIR ~/.local/share/dodot

for dir in $DODOT_DATA_DIR/packs/*/path/*
    test -d $dir; and fish_add_path --prepend $dir
end

for snippet in $DODOT_DATA_DIR/shell/profile.d/*.sh
    test -r $snippet; and sh $snippet
end
"#;

fn script_content(fsys: &dyn Filesystem, paths: &Paths, name: &str, embedded: &str) -> Vec<u8> {
    // PROJECT_ROOT lets development builds ship edited scripts without a
    // rebuild.
    if let Some(root) = paths.project_root() {
        let candidate = root.join("shell").join(name);
        if let Ok(content) = fsys.read_file(&candidate) {
            return content;
        }
    }
    embedded.as_bytes().to_vec()
}

/// Install the integration scripts and the profile directory.
///
/// Returns the paths written. Existing scripts are refreshed in place.
pub fn install(fsys: &dyn Filesystem, paths: &Paths) -> Result<Vec<PathBuf>> {
    fsys.mkdir_all(&paths.shell_profile_dir(), 0o755)?;

    let mut written = Vec::new();
    for (name, embedded) in [(INIT_SCRIPT, INIT_SH), (INIT_FISH_SCRIPT, INIT_FISH)] {
        let target = paths.shell_dir().join(name);
        let content = script_content(fsys, paths, name, embedded);
        fsys.write_file(&target, &content, 0o644)?;
        written.push(target);
    }
    Ok(written)
}
