//! `status`: read-only view of every pack's deployment state.

use std::path::PathBuf;

use crate::error::Result;
use crate::pack::{self, CONFIG_FILE};
use crate::result::{DisplayFile, DisplayPack, PackCommandResult, PackStatus};
use crate::rules;
use crate::status::{FileState, file_state};
use crate::verbs::Context;

/// Report the per-file state machine for the selected packs. Mutates
/// nothing.
pub fn status(ctx: &Context<'_>, packs: &[String]) -> Result<PackCommandResult> {
    let mut result = PackCommandResult::new("status", false);
    let selected = pack::select(ctx.fsys, &ctx.paths, packs)?;
    let store = ctx.store();

    for pk in &selected {
        let mut display = if pk.ignored {
            DisplayPack::new(&pk.name, PackStatus::Ignored)
        } else if store.is_off(&pk.name) {
            DisplayPack::new(&pk.name, PackStatus::Off)
        } else {
            DisplayPack::new(&pk.name, PackStatus::Ok)
        };

        let config_path = pk.dir.join(CONFIG_FILE);
        if ctx.fsys.exists(&config_path) {
            display.files.push(DisplayFile {
                relative: PathBuf::from(CONFIG_FILE),
                handler: String::new(),
                state: FileState::Config,
                note: None,
            });
        }

        if pk.ignored {
            result.packs.push(display);
            continue;
        }

        for matched in rules::match_pack(ctx.fsys, pk, &ctx.rules)? {
            let state = file_state(ctx.fsys, &ctx.paths, &ctx.registry, &store, &matched)?;
            display.files.push(DisplayFile {
                relative: matched.relative.clone(),
                handler: matched.handler.clone(),
                state,
                note: None,
            });
        }
        result.packs.push(display);
    }

    Ok(result)
}
