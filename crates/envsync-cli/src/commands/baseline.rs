//! Baseline command implementation

use colored::Colorize;

use envsync_core::StagingEngine;

use crate::error::Result;

/// Run the baseline command
pub fn run_baseline(engine: &StagingEngine) -> Result<()> {
    let count = engine.capture_baseline()?;
    println!(
        "{} Captured {} baseline entries for {}",
        "OK".green().bold(),
        count,
        engine.destination().name.yellow()
    );
    Ok(())
}
