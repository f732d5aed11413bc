//! Diff and preview commands

use colored::Colorize;
use serde::Serialize;

use envsync_core::{ChangeStatus, DatabaseDiffReport, FileDiffReport, StagingEngine};

use crate::error::Result;

/// Which axes `diff` covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffScope {
    Files,
    Database,
    Both,
}

impl DiffScope {
    pub fn from_flags(files: bool, database: bool) -> Self {
        match (files, database) {
            (true, false) => Self::Files,
            (false, true) => Self::Database,
            _ => Self::Both,
        }
    }
}

#[derive(Debug, Serialize)]
struct DiffOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<FileDiffReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<DatabaseDiffReport>,
}

/// Run the diff command
pub fn run_diff(engine: &StagingEngine, scope: DiffScope, json: bool) -> Result<()> {
    let files = match scope {
        DiffScope::Files | DiffScope::Both => Some(engine.diff_files()?),
        DiffScope::Database => None,
    };
    let database = match scope {
        DiffScope::Database | DiffScope::Both => Some(engine.diff_database()?),
        DiffScope::Files => None,
    };

    if json {
        let output = DiffOutput { files, database };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{} {} -> {}",
        "Diff".blue().bold(),
        engine.source().name.yellow(),
        engine.destination().name.yellow()
    );

    let mut empty = true;
    if let Some(report) = &files {
        empty &= report.changes.is_empty();
        print_files(report);
    }
    if let Some(report) = &database {
        empty &= report.changes.is_empty();
        print_database(report);
    }

    println!();
    if empty {
        println!("{} Environments are in sync.", "OK".green().bold());
    } else {
        println!("Run {} to apply changes.", "envsync sync <ITEM>...".cyan());
    }
    Ok(())
}

fn marker(status: ChangeStatus) -> colored::ColoredString {
    match status {
        ChangeStatus::Added => "+".green(),
        ChangeStatus::Modified => "~".yellow(),
        ChangeStatus::Deleted => "-".red(),
    }
}

fn print_files(report: &FileDiffReport) {
    println!();
    println!("{} ({})", "Files".bold(), report.changes.len());
    for change in &report.changes {
        println!("  {} {}", marker(change.status), change.relative_path);
    }
    for warning in &report.warnings {
        println!("  {} {}", "!".yellow(), warning.message);
    }
}

fn print_database(report: &DatabaseDiffReport) {
    println!();
    println!("{} ({})", "Database".bold(), report.changes.len());
    for change in &report.changes {
        println!(
            "  {} {} {}",
            marker(change.status),
            format!("row:{}/{}", change.table, change.primary_key_value).dimmed(),
            change.summary
        );
    }
    for issue in &report.issues {
        println!("  {} {}: {}", "!".yellow(), issue.table, issue.message);
    }
}

/// Run the preview command
pub fn run_preview(engine: &StagingEngine, path: &str) -> Result<()> {
    match engine.preview_file(path)? {
        Some(diff) if diff.is_empty() => {
            println!("{} {} is identical on both sides.", "OK".green().bold(), path);
        }
        Some(diff) => {
            for line in diff.lines() {
                if line.starts_with("+++") || line.starts_with("---") {
                    println!("{}", line.bold());
                } else if line.starts_with('+') {
                    println!("{}", line.green());
                } else if line.starts_with('-') {
                    println!("{}", line.red());
                } else if line.starts_with("@@") {
                    println!("{}", line.cyan());
                } else {
                    println!("{line}");
                }
            }
        }
        None => println!("No text preview for {path} (binary, not UTF-8, or missing on both sides)."),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_flags() {
        assert_eq!(DiffScope::from_flags(true, false), DiffScope::Files);
        assert_eq!(DiffScope::from_flags(false, true), DiffScope::Database);
        assert_eq!(DiffScope::from_flags(false, false), DiffScope::Both);
    }
}
