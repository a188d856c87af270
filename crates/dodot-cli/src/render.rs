//! Result rendering: status tables and per-pack summaries.

use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use dodot_core::result::{PackCommandResult, PackStatus, keys};

fn status_label(status: PackStatus) -> &'static str {
    match status {
        PackStatus::Ok => "ok",
        PackStatus::Partial => "partial",
        PackStatus::Error => "error",
        PackStatus::Ignored => "ignored",
        PackStatus::Off => "off",
    }
}

/// Render a status result as a table.
pub fn print_status(result: &PackCommandResult) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["PACK", "FILE", "HANDLER", "STATE"]);

    for pack in &result.packs {
        if pack.files.is_empty() {
            table.add_row([
                Cell::new(&pack.name),
                Cell::new(""),
                Cell::new(""),
                Cell::new(status_label(pack.status)),
            ]);
            continue;
        }
        for file in &pack.files {
            table.add_row([
                Cell::new(&pack.name),
                Cell::new(file.relative.display()),
                Cell::new(&file.handler),
                Cell::new(file.state.to_string()),
            ]);
        }
    }

    println!("{table}");
}

/// Render a mutation verb result: one line per pack plus totals.
pub fn print_result(result: &PackCommandResult, quiet: bool) {
    for error in &result.errors {
        eprintln!("{error}");
    }
    if quiet {
        return;
    }

    let prefix = if result.dry_run { "[dry-run] " } else { "" };
    for pack in &result.packs {
        match &pack.error {
            Some(error) => {
                println!("{prefix}{}: {} ({error})", pack.name, status_label(pack.status));
            }
            None => println!("{prefix}{}: {}", pack.name, status_label(pack.status)),
        }
    }

    if let Some(message) = &result.message {
        println!("{message}");
    }
    for key in [
        keys::TOTAL_DEPLOYED,
        keys::TOTAL_CLEARED,
        keys::FILES_ADOPTED,
        keys::FILES_CREATED,
    ] {
        if let Some(count) = result.metadata.get(key).and_then(|v| v.as_u64()) {
            if count > 0 {
                println!("{key}: {count}");
            }
        }
    }
}

/// Render an invocation-level error to stderr, with the code in brackets.
pub fn print_error(error: &dodot_core::Error, verbose: bool) {
    eprintln!("{error}");
    if verbose {
        for cause in error.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
    }
}
