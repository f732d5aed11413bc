//! Diffing the two environments
//!
//! This module provides:
//! - **tree**: content-hash comparison of the two file trees
//! - **relational**: key-by-key comparison of paired database tables
//!
//! Both differs are read-only and run their work on scoped worker threads.
//! Per-path and per-table problems end up in the reports instead of
//! failing the whole diff.

mod relational;
mod tree;

pub use relational::RelationalDiffer;
pub use tree::TreeDiffer;

use std::num::NonZeroUsize;

use envsync_fs::ScanWarning;
use serde::{Deserialize, Serialize};

use crate::model::{FileChange, RowChange};

/// Result of comparing the two file trees
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiffReport {
    /// Changed paths, ordered by path
    pub changes: Vec<FileChange>,
    /// Entries that could not be compared
    pub warnings: Vec<ScanWarning>,
}

impl FileDiffReport {
    pub fn find(&self, relative_path: &str) -> Option<&FileChange> {
        self.changes
            .iter()
            .find(|c| c.relative_path == relative_path)
    }
}

/// A table the relational differ had to skip
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    /// Logical table name
    pub table: String,
    pub message: String,
}

/// Result of comparing the two databases
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDiffReport {
    /// Changed rows, ordered by table then key
    pub changes: Vec<RowChange>,
    /// Tables that were skipped
    pub issues: Vec<SchemaIssue>,
}

impl DatabaseDiffReport {
    pub fn find(&self, table: &str, key: &str) -> Option<&RowChange> {
        self.changes
            .iter()
            .find(|c| c.table == table && c.primary_key_value == key)
    }
}

/// Number of workers to use for `jobs` independent units of work.
pub(crate) fn worker_count(jobs: usize, cap: Option<usize>) -> usize {
    let available = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    jobs.min(cap.unwrap_or(available).max(1)).max(1)
}

/// Deal `jobs` round-robin into `workers` buckets, preserving order per bucket.
pub(crate) fn deal<T>(jobs: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let mut buckets: Vec<Vec<T>> = (0..workers.max(1)).map(|_| Vec::new()).collect();
    let count = buckets.len();
    for (idx, job) in jobs.into_iter().enumerate() {
        buckets[idx % count].push(job);
    }
    buckets.retain(|b| !b.is_empty());
    buckets
}
