//! envsync CLI
//!
//! Review the differences between a staging and a production environment
//! and push selected changes.

mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::Result;

fn main() {
    if let Err(e) = run() {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(cmd) => execute_command(&cli.config, cmd),
        None => {
            println!("{} staging/production sync", "envsync".green().bold());
            println!();
            println!("Run {} for available commands.", "envsync --help".cyan());
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise debug with `-v` and warnings only without.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
    if result.is_ok() {
        tracing::debug!("verbose mode enabled");
    }
}

fn execute_command(config: &std::path::Path, cmd: Commands) -> Result<()> {
    let engine = context::open_engine(config)?;
    match cmd {
        Commands::Diff {
            files,
            database,
            json,
        } => commands::run_diff(&engine, commands::DiffScope::from_flags(files, database), json),
        Commands::Groups { json } => commands::run_groups(&engine, json),
        Commands::Preview { path } => commands::run_preview(&engine, &path),
        Commands::Baseline => commands::run_baseline(&engine),
        Commands::Conflicts { detect, json } => commands::run_conflicts(&engine, &detect, json),
        Commands::Resolve {
            id,
            source,
            destination,
            custom,
        } => commands::run_resolve(&engine, &id, source, destination, custom.as_deref()),
        Commands::Sync {
            items,
            dry_run,
            json,
        } => commands::run_sync(&engine, &items, dry_run, json),
    }
}
