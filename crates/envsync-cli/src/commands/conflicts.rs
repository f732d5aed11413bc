//! Conflict listing, detection and resolution commands

use colored::Colorize;

use envsync_core::model::ItemType;
use envsync_core::{Conflict, Decision, ItemValue, StagingEngine};

use super::parse_items;
use crate::error::{CliError, Result};

/// Run the conflicts command
///
/// With `detect` items, detection runs first and newly found conflicts are
/// reported before the full listing.
pub fn run_conflicts(engine: &StagingEngine, detect: &[String], json: bool) -> Result<()> {
    if !detect.is_empty() {
        let items = parse_items(detect)?;
        let detected = engine.detect_conflicts(&items)?;
        if !json {
            println!("Detected {} new conflict(s).", detected.len());
            println!();
        }
    }

    let conflicts = engine.conflicts()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("{} No conflicts recorded.", "OK".green().bold());
        return Ok(());
    }
    for conflict in &conflicts {
        print_conflict(conflict);
    }
    Ok(())
}

fn print_conflict(conflict: &Conflict) {
    let state = match conflict.resolution {
        Some(resolution) if conflict.resolved => format!("resolved: {resolution}").green(),
        _ => "unresolved".red(),
    };
    println!(
        "{} {} [{}]",
        conflict.id.to_string().cyan(),
        conflict.item_ref,
        state
    );
    let destination = conflict
        .destination_fingerprint
        .as_ref()
        .map_or("absent", |fp| fp.short());
    println!(
        "    detected {} (destination {})",
        conflict.detected_at.format("%Y-%m-%d %H:%M:%S UTC"),
        destination
    );
}

/// Run the resolve command
pub fn run_resolve(
    engine: &StagingEngine,
    id: &str,
    source: bool,
    destination: bool,
    custom: Option<&str>,
) -> Result<()> {
    let decision = match (source, destination, custom) {
        (true, _, _) => Decision::KeepSource,
        (_, true, _) => Decision::KeepDestination,
        (_, _, Some(value)) => Decision::Custom(custom_value(engine, id, value)?),
        _ => return Err(CliError::user("choose --source, --destination or --custom")),
    };

    let outcome = engine.resolve_conflict(id, decision)?;
    println!(
        "{} Conflict {} resolved: {}",
        "OK".green().bold(),
        id.cyan(),
        outcome.resolution
    );
    Ok(())
}

/// File conflicts take the value as content; row conflicts take a JSON object.
fn custom_value(engine: &StagingEngine, id: &str, value: &str) -> Result<ItemValue> {
    let item_type = engine
        .conflicts()?
        .into_iter()
        .find(|c| c.id.to_string() == id.trim())
        .map(|c| c.item_type);

    match item_type {
        Some(ItemType::Database) => {
            let json: serde_json::Value = serde_json::from_str(value)?;
            Ok(ItemValue::row_from_json(&json)?)
        }
        // Unknown ids fall through to the engine, which reports them
        Some(ItemType::File) | None => Ok(ItemValue::Content(value.as_bytes().to_vec())),
    }
}
