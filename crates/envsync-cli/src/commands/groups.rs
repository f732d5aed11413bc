//! Groups command implementation

use colored::Colorize;

use envsync_core::StagingEngine;

use crate::error::Result;

/// Run the groups command
///
/// Groups are listed per kind; rows that belong to no group follow.
pub fn run_groups(engine: &StagingEngine, json: bool) -> Result<()> {
    let grouped = engine.grouped_changes()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&grouped)?);
        return Ok(());
    }

    if grouped.groups.is_empty() && grouped.standalone.is_empty() {
        println!("{} No database changes.", "OK".green().bold());
        return Ok(());
    }

    for (kind, groups) in grouped.by_kind() {
        println!("{} ({})", kind.bold(), groups.len());
        for group in groups {
            println!(
                "  {} {} [{}, {} rows]",
                format!("group:{}", group.group_id).cyan(),
                group.title,
                group.status,
                group.row_count()
            );
        }
        println!();
    }

    if !grouped.standalone.is_empty() {
        println!("{} ({})", "Other rows".bold(), grouped.standalone.len());
        for change in &grouped.standalone {
            println!(
                "  {} {}",
                format!("row:{}/{}", change.table, change.primary_key_value).dimmed(),
                change.summary
            );
        }
    }
    Ok(())
}
