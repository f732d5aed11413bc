//! Sync command implementation

use colored::Colorize;

use envsync_core::{StagingEngine, SyncOptions, SyncReport};

use super::parse_items;
use crate::error::{CliError, Result};

/// Run the sync command
///
/// Exits with an error when any item failed, after printing every result.
pub fn run_sync(engine: &StagingEngine, items: &[String], dry_run: bool, json: bool) -> Result<()> {
    let selected = parse_items(items)?;
    let options = SyncOptions {
        dry_run,
        ..SyncOptions::default()
    };
    let report = engine.synchronize_with_options(&selected, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    let failed = report.failed().count();
    if failed > 0 {
        return Err(CliError::user(format!(
            "{failed} of {} item(s) failed",
            report.results.len()
        )));
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    let title = if report.dry_run { "Sync (dry run)" } else { "Sync" };
    println!("{}", title.blue().bold());
    for result in &report.results {
        let mark = if result.is_success() {
            "ok".green()
        } else {
            "FAILED".red()
        };
        println!("  {} {} {}", mark, result.item_ref, result.message);
    }
    if report.aborted {
        println!();
        println!("{}", "Run stopped before the last item.".yellow());
    }
    println!();
    println!(
        "{} succeeded, {} failed",
        report.succeeded().count(),
        report.failed().count()
    );
}
