//! Manifest parsing for envsync.toml files
//!
//! The manifest names the two environments and carries the engine settings.
//! Relative paths in it are resolved against the manifest's directory.

use std::path::Path;

use envsync_fs::{ConfigStore, NormalizedPath};
use serde::{Deserialize, Serialize};

use super::settings::EngineConfig;
use crate::environment::Environment;
use crate::{Error, Result};

/// Directory for conflict/baseline state and the sync lock, when not configured
const DEFAULT_STATE_DIR: &str = ".envsync";

/// One environment as described in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    /// File tree root
    pub root: String,
    /// SQLite database file
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub table_prefix: String,
}

impl EndpointConfig {
    pub fn environment(&self) -> Environment {
        Environment::new(
            self.name.clone(),
            NormalizedPath::new(&self.root),
            self.table_prefix.clone(),
        )
    }

    fn resolve_against(&mut self, base: &Path) {
        self.root = resolve(base, &self.root);
        // Roots that exist are compared by their canonical form
        if let Ok(canonical) = NormalizedPath::canonical_root(&self.root) {
            self.root = canonical.as_str().to_string();
        }
        if let Some(db) = &self.database {
            self.database = Some(resolve(base, db));
        }
    }
}

fn resolve(base: &Path, value: &str) -> String {
    let path = Path::new(value);
    if path.is_absolute() {
        value.to_string()
    } else {
        NormalizedPath::new(base.join(path)).as_str().to_string()
    }
}

/// Parsed `envsync.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub source: EndpointConfig,
    pub destination: EndpointConfig,
    /// Where conflicts, baselines and the sync lock live
    #[serde(default)]
    pub state_dir: Option<String>,
    #[serde(flatten)]
    pub engine: EngineConfig,
}

impl Manifest {
    /// Parse a manifest from TOML content
    ///
    /// # Example
    ///
    /// ```
    /// use envsync_core::config::Manifest;
    ///
    /// let manifest = Manifest::parse(r#"
    /// [source]
    /// name = "staging"
    /// root = "/srv/staging"
    /// table_prefix = "wpstg0_"
    ///
    /// [destination]
    /// name = "production"
    /// root = "/srv/www"
    /// table_prefix = "wp_"
    ///
    /// [exclusions]
    /// columns = ["post_modified"]
    /// "#).unwrap();
    ///
    /// assert_eq!(manifest.source.table_prefix, "wpstg0_");
    /// assert_eq!(manifest.engine.exclusions.columns, vec!["post_modified"]);
    /// ```
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Manifest = toml::from_str(content)?;
        Ok(manifest)
    }

    /// Load a manifest file (TOML, JSON or YAML by extension) and resolve
    /// its relative paths against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut manifest: Manifest = ConfigStore::new().load(&NormalizedPath::new(path))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.source.resolve_against(base);
        manifest.destination.resolve_against(base);
        manifest.state_dir = Some(resolve(
            base,
            manifest.state_dir.as_deref().unwrap_or(DEFAULT_STATE_DIR),
        ));

        tracing::debug!(
            source = %manifest.source.name,
            destination = %manifest.destination.name,
            "loaded manifest"
        );
        Ok(manifest)
    }

    /// State directory, defaulting to `.envsync` in the working directory.
    pub fn state_dir(&self) -> NormalizedPath {
        NormalizedPath::new(self.state_dir.as_deref().unwrap_or(DEFAULT_STATE_DIR))
    }
}
