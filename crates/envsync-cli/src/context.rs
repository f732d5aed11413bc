//! Manifest lookup and engine construction

use std::path::Path;

use envsync_core::{Manifest, StagingEngine};

use crate::error::{CliError, Result};

/// Load the manifest at `path` and build an engine for it.
pub fn open_engine(path: &Path) -> Result<StagingEngine> {
    if !path.is_file() {
        return Err(CliError::user(format!(
            "no manifest at {} (pass one with --config)",
            path.display()
        )));
    }
    let manifest = Manifest::load(path)?;
    tracing::debug!(
        source = %manifest.source.name,
        destination = %manifest.destination.name,
        "opening environments"
    );
    Ok(StagingEngine::from_manifest(&manifest)?)
}
