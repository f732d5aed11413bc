//! Engine settings sections

use std::time::Duration;

use envsync_fs::ExclusionRules;
use serde::{Deserialize, Serialize};

use crate::Result;

fn default_excluded_paths() -> Vec<String> {
    vec![".envsync".to_string()]
}

fn default_excluded_extensions() -> Vec<String> {
    vec!["log".to_string(), "tmp".to_string()]
}

/// What the differs never look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionConfig {
    /// Path prefixes and globs, relative to each root
    #[serde(default = "default_excluded_paths")]
    pub paths: Vec<String>,
    /// File extensions, with or without the leading dot
    #[serde(default = "default_excluded_extensions")]
    pub extensions: Vec<String>,
    /// Logical table names
    #[serde(default)]
    pub tables: Vec<String>,
    /// Column names (any table) or `table.column`
    #[serde(default)]
    pub columns: Vec<String>,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            paths: default_excluded_paths(),
            extensions: default_excluded_extensions(),
            tables: Vec::new(),
            columns: Vec::new(),
        }
    }
}

impl ExclusionConfig {
    /// Compile the path and extension rules for the tree walker.
    pub fn rules(&self) -> Result<ExclusionRules> {
        Ok(ExclusionRules::new(&self.paths, &self.extensions)?)
    }

    pub fn is_table_excluded(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }

    pub fn is_column_excluded(&self, table: &str, column: &str) -> bool {
        self.columns.iter().any(|entry| match entry.split_once('.') {
            Some((t, c)) => t == table && c == column,
            None => entry == column,
        })
    }
}

/// A rule hiding system-internal rows, e.g. transient cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredRowRule {
    /// Logical table name
    pub table: String,
    /// Column whose value is matched
    pub column: String,
    /// Glob over the column's text value (`*` and `?`)
    pub pattern: String,
}

impl IgnoredRowRule {
    pub fn new(table: &str, column: &str, pattern: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            pattern: pattern.to_string(),
        }
    }
}

fn default_label_columns() -> Vec<String> {
    ["post_title", "title", "name", "option_name", "meta_key", "slug"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_ignored_rows() -> Vec<IgnoredRowRule> {
    vec![
        IgnoredRowRule::new("options", "option_name", "_transient_*"),
        IgnoredRowRule::new("options", "option_name", "_site_transient_*"),
    ]
}

/// Relational differ settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Columns tried, in order, to label a row in its summary
    #[serde(default = "default_label_columns")]
    pub label_columns: Vec<String>,
    /// System-internal rows filtered out of every diff
    #[serde(default = "default_ignored_rows")]
    pub ignored_rows: Vec<IgnoredRowRule>,
    /// Upper bound on concurrent table workers; defaults to available parallelism
    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            label_columns: default_label_columns(),
            ignored_rows: default_ignored_rows(),
            max_workers: None,
        }
    }
}

/// A table whose rows point at primary-table rows through a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignLink {
    pub table: String,
    pub foreign_column: String,
}

impl ForeignLink {
    pub fn new(table: &str, foreign_column: &str) -> Self {
        Self {
            table: table.to_string(),
            foreign_column: foreign_column.to_string(),
        }
    }
}

/// How row changes are clustered into content groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Table holding anchors, children and attachments
    pub primary_table: String,
    /// Column referencing the parent row's key; empty, `0` or NULL means root
    pub parent_column: String,
    /// Column declaring the row's kind
    pub kind_column: String,
    /// Column used as group title
    pub title_column: String,
    /// Kind value marking attachment rows
    pub attachment_kind: String,
    /// Metadata tables keyed by the owning row's id
    pub metadata: Vec<ForeignLink>,
    /// Other tables carrying a foreign id into the primary table
    pub related: Vec<ForeignLink>,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            primary_table: "posts".to_string(),
            parent_column: "post_parent".to_string(),
            kind_column: "post_type".to_string(),
            title_column: "post_title".to_string(),
            attachment_kind: "attachment".to_string(),
            metadata: vec![ForeignLink::new("postmeta", "post_id")],
            related: vec![
                ForeignLink::new("term_relationships", "object_id"),
                ForeignLink::new("comments", "comment_post_ID"),
            ],
        }
    }
}

const fn default_ttl_secs() -> u64 {
    300
}

/// Diff cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

const fn default_lock_timeout_secs() -> u64 {
    30
}

/// Synchronizer settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// How long a run waits for another run's lock
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl SyncConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// Every engine setting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub exclusions: ExclusionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub grouping: GroupingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}
