//! dodot - deploy dotfiles from packs.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use dodot_core::exec::ProcessRunner;
use dodot_core::fsys::OsFilesystem;
use dodot_core::verbs::{
    self, AdoptOptions, Context, LinkOptions, OffOptions, OnOptions,
};
use dodot_core::{PackCommandResult, Paths};

mod logging;
mod render;

#[derive(Parser)]
#[command(name = "dodot")]
#[command(version = env!("DODOT_VERSION"), about = "dodot - deploy dotfiles from packs")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deploy configuration handlers (symlinks, shell, path)
    Link {
        /// Pack name(s); empty means all packs
        packs: Vec<String>,
        /// Show what would happen without making changes
        #[arg(long)]
        dry_run: bool,
        /// Overwrite existing files at user-visible link targets
        #[arg(long)]
        force: bool,
        /// Allow symlinks into the home directory (always on; kept for
        /// script compatibility)
        #[arg(long)]
        enable_home_symlinks: bool,
    },
    /// Run code-execution handlers (install scripts, Brewfiles)
    Provision {
        /// Pack name(s); empty means all packs
        packs: Vec<String>,
        /// Show what would happen without making changes
        #[arg(long)]
        dry_run: bool,
        /// Re-run even when a matching sentinel exists
        #[arg(long)]
        force: bool,
        /// Allow symlinks into the home directory (always on; kept for
        /// script compatibility)
        #[arg(long)]
        enable_home_symlinks: bool,
    },
    /// Turn packs on: link, provision, install shell integration
    On {
        /// Pack name(s); empty means all packs
        packs: Vec<String>,
        /// Show what would happen without making changes
        #[arg(long)]
        dry_run: bool,
        /// Overwrite existing files; re-run provisioning
        #[arg(long)]
        force: bool,
        /// Skip the provision phase
        #[arg(long, conflicts_with = "provision_rerun")]
        no_provision: bool,
        /// Force the provision phase even when sentinels match
        #[arg(long)]
        provision_rerun: bool,
    },
    /// Turn packs off, capturing a restorable state
    Off {
        /// Pack name(s); empty means all packs
        packs: Vec<String>,
        /// Show what would happen without making changes
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove configuration-handler links
    Unlink {
        /// Pack name(s); empty means all packs
        packs: Vec<String>,
        /// Show what would happen without making changes
        #[arg(long)]
        dry_run: bool,
    },
    /// Clear provisioning sentinels so the next provision re-runs
    Deprovision {
        /// Pack name(s); empty means all packs
        packs: Vec<String>,
        /// Show what would happen without making changes
        #[arg(long)]
        dry_run: bool,
    },
    /// Move existing files into a pack and link them back
    Adopt {
        /// Pack receiving the files
        pack: String,
        /// Files to adopt (absolute paths)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Overwrite an existing destination inside the pack
        #[arg(long)]
        force: bool,
    },
    /// Write missing handler templates into a pack
    Fill {
        /// Pack to fill
        pack: String,
    },
    /// Create a new pack with config skeleton and templates
    Init {
        /// Name of the new pack
        pack: String,
    },
    /// Mark a pack as ignored
    #[command(name = "add-ignore")]
    AddIgnore {
        /// Pack to ignore
        pack: String,
    },
    /// Show the per-file deployment state
    Status {
        /// Pack name(s); empty means all packs
        packs: Vec<String>,
    },
    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Print the dodot version
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Completion { shell } => {
            clap_complete::generate(
                *shell,
                &mut Cli::command(),
                "dodot",
                &mut std::io::stdout(),
            );
            return ExitCode::SUCCESS;
        }
        Commands::Version => {
            println!("dodot {}", env!("DODOT_VERSION"));
            return ExitCode::SUCCESS;
        }
        _ => {}
    }

    let paths = match Paths::from_env() {
        Ok(paths) => paths,
        Err(err) => {
            render::print_error(&err, cli.verbose > 0);
            return ExitCode::FAILURE;
        }
    };
    logging::setup(cli.verbose, &paths.log_file());

    let fsys = OsFilesystem::new();
    let runner = ProcessRunner::new();
    let ctx = Context::new(&fsys, paths, &runner);

    match run(&ctx, cli.command, cli.quiet) {
        Ok(result) => {
            if result.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            render::print_error(&err, cli.verbose > 0);
            ExitCode::FAILURE
        }
    }
}

fn run(
    ctx: &Context<'_>,
    command: Commands,
    quiet: bool,
) -> dodot_core::Result<PackCommandResult> {
    let result = match command {
        Commands::Link {
            packs,
            dry_run,
            force,
            enable_home_symlinks: _,
        } => verbs::link(ctx, &packs, LinkOptions { dry_run, force })?,
        Commands::Provision {
            packs,
            dry_run,
            force,
            enable_home_symlinks: _,
        } => verbs::provision(ctx, &packs, LinkOptions { dry_run, force })?,
        Commands::On {
            packs,
            dry_run,
            force,
            no_provision,
            provision_rerun,
        } => verbs::on(
            ctx,
            &packs,
            OnOptions {
                dry_run,
                force,
                no_provision,
                provision_rerun,
            },
        )?,
        Commands::Off { packs, dry_run } => verbs::off(ctx, &packs, OffOptions { dry_run })?,
        Commands::Unlink { packs, dry_run } => {
            verbs::unlink(ctx, &packs, OffOptions { dry_run })?
        }
        Commands::Deprovision { packs, dry_run } => {
            verbs::deprovision(ctx, &packs, OffOptions { dry_run })?
        }
        Commands::Adopt { pack, paths, force } => {
            verbs::adopt(ctx, &pack, &paths, AdoptOptions { force })?
        }
        Commands::Fill { pack } => verbs::fill(ctx, &pack)?,
        Commands::Init { pack } => verbs::init(ctx, &pack)?,
        Commands::AddIgnore { pack } => verbs::add_ignore(ctx, &pack)?,
        Commands::Status { packs } => {
            let result = verbs::status(ctx, &packs)?;
            render::print_status(&result);
            return Ok(result);
        }
        Commands::Completion { .. } | Commands::Version => {
            unreachable!("handled before dispatch")
        }
    };

    render::print_result(&result, quiet);
    Ok(result)
}
