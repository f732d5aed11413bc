//! Relational data access for one environment
//!
//! The engine only needs table listing, schema introspection and
//! key-addressed row reads/writes. [`RowStore`] is that seam; the SQLite
//! implementation lives in [`sqlite`].

pub mod sqlite;

pub use sqlite::SqliteStore;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};
use crate::model::Row;

/// A column as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type, as written in the schema
    pub declared_type: String,
}

/// Columns and primary key of one physical table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    /// Primary key columns in key order; empty when the table has none
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// The primary key column, when the key is exactly one column.
    pub fn single_primary_key(&self) -> Option<&str> {
        match self.primary_key.as_slice() {
            [column] => Some(column.as_str()),
            _ => None,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// Key-addressed access to an environment's tables.
///
/// Table names are physical names. Keys travel as text; stores convert them
/// to the column's type. Implementations must be shareable across the
/// per-table diff workers.
pub trait RowStore: Send + Sync {
    /// Physical table names, sorted.
    fn tables(&self) -> Result<Vec<String>>;

    /// Columns and primary key of `table`.
    fn schema(&self, table: &str) -> Result<TableSchema>;

    /// Every primary key value of `table`, as text.
    fn primary_keys(&self, table: &str, key_column: &str) -> Result<Vec<String>>;

    /// One row by key.
    fn fetch_row(&self, table: &str, key_column: &str, key: &str) -> Result<Option<Row>>;

    /// Insert a full row.
    fn insert_row(&self, table: &str, row: &Row) -> Result<()>;

    /// Update the given columns of one row; returns the number of rows changed.
    fn update_row(&self, table: &str, key_column: &str, key: &str, values: &Row) -> Result<usize>;

    /// Delete one row; returns the number of rows removed.
    fn delete_row(&self, table: &str, key_column: &str, key: &str) -> Result<usize>;

    /// Whether `err`, raised by this store, means the store as a whole is
    /// unusable rather than one statement failing.
    fn is_unavailable(&self, err: &Error) -> bool {
        err.is_destination_unavailable()
    }
}
