//! Environment descriptors
//!
//! The provisioning side knows where each environment lives and which table
//! prefix its database uses; the engine is told, it never guesses.

use std::sync::Arc;

use envsync_fs::NormalizedPath;
use serde::{Deserialize, Serialize};

use crate::store::RowStore;

/// One side of the comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Stable name, used in cache keys and conflict records
    pub name: String,
    /// Root of the environment's file tree
    pub root: NormalizedPath,
    /// Prefix of every table that belongs to this environment
    #[serde(default)]
    pub table_prefix: String,
}

impl Environment {
    pub fn new(
        name: impl Into<String>,
        root: impl Into<NormalizedPath>,
        table_prefix: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            table_prefix: table_prefix.into(),
        }
    }

    /// Physical table name for a logical one.
    pub fn physical_table(&self, logical: &str) -> String {
        format!("{}{}", self.table_prefix, logical)
    }

    /// Logical table name for a physical one, if it carries this prefix.
    pub fn logical_table<'a>(&self, physical: &'a str) -> Option<&'a str> {
        physical
            .strip_prefix(self.table_prefix.as_str())
            .filter(|name| !name.is_empty())
    }

    /// Absolute path of a file inside this environment.
    pub fn file_path(&self, relative: &str) -> NormalizedPath {
        self.root.join(relative)
    }
}

/// An environment together with access to its database.
#[derive(Clone)]
pub struct Endpoint {
    pub environment: Environment,
    pub store: Arc<dyn RowStore>,
}

impl Endpoint {
    pub fn new(environment: Environment, store: Arc<dyn RowStore>) -> Self {
        Self { environment, store }
    }

    pub fn name(&self) -> &str {
        &self.environment.name
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_map_logical_and_physical_names() {
        let env = Environment::new("staging", "/srv/staging", "wpstg0_");
        assert_eq!(env.physical_table("posts"), "wpstg0_posts");
        assert_eq!(env.logical_table("wpstg0_posts"), Some("posts"));
        assert_eq!(env.logical_table("wp_posts"), None);
        assert_eq!(env.logical_table("wpstg0_"), None);
    }

    #[test]
    fn empty_prefix_keeps_names() {
        let env = Environment::new("prod", "/srv/prod", "");
        assert_eq!(env.physical_table("items"), "items");
        assert_eq!(env.logical_table("items"), Some("items"));
    }

    #[test]
    fn descriptor_reads_from_json() {
        let env: Environment =
            serde_json::from_str(r#"{"name":"production","root":"/srv/www"}"#).unwrap();
        assert_eq!(env, Environment::new("production", "/srv/www", ""));
        assert_eq!(env.file_path("index.php").as_str(), "/srv/www/index.php");
    }
}
