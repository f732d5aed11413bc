//! Short-lived cache of diff reports
//!
//! Diffing a large site is expensive and the review UI asks for the same
//! diff repeatedly. Entries expire after a TTL and are dropped for an
//! environment pair whenever a sync writes to it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::diff::{DatabaseDiffReport, FileDiffReport};

/// Which diff a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffScope {
    Files,
    Database,
}

#[derive(Debug, Clone)]
enum Cached {
    Files(FileDiffReport),
    Database(DatabaseDiffReport),
}

type Key = (String, String, DiffScope);

/// TTL cache keyed by (source name, destination name, scope).
///
/// Share it between engines with an `Arc`.
#[derive(Debug)]
pub struct DiffCache {
    ttl: Duration,
    entries: Mutex<HashMap<Key, (Instant, Cached)>>,
}

impl DiffCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn files(&self, source: &str, destination: &str) -> Option<FileDiffReport> {
        match self.get(source, destination, DiffScope::Files)? {
            Cached::Files(report) => Some(report),
            Cached::Database(_) => None,
        }
    }

    pub fn database(&self, source: &str, destination: &str) -> Option<DatabaseDiffReport> {
        match self.get(source, destination, DiffScope::Database)? {
            Cached::Database(report) => Some(report),
            Cached::Files(_) => None,
        }
    }

    pub fn store_files(&self, source: &str, destination: &str, report: FileDiffReport) {
        self.put(source, destination, DiffScope::Files, Cached::Files(report));
    }

    pub fn store_database(&self, source: &str, destination: &str, report: DatabaseDiffReport) {
        self.put(source, destination, DiffScope::Database, Cached::Database(report));
    }

    /// Drop every entry for the environment pair.
    pub fn invalidate_pair(&self, source: &str, destination: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(s, d, _), _| !(s == source && d == destination));
            tracing::debug!(%source, %destination, "diff cache invalidated");
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn get(&self, source: &str, destination: &str, scope: DiffScope) -> Option<Cached> {
        let mut entries = self.entries.lock().ok()?;
        let key = (source.to_string(), destination.to_string(), scope);
        let fresh = entries
            .get(&key)
            .map(|(stored, _)| stored.elapsed() < self.ttl)?;
        if !fresh {
            entries.remove(&key);
            return None;
        }
        tracing::debug!(%source, %destination, ?scope, "diff cache hit");
        entries.get(&key).map(|(_, cached)| cached.clone())
    }

    fn put(&self, source: &str, destination: &str, scope: DiffScope, cached: Cached) {
        // A poisoned cache only means no caching
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                (source.to_string(), destination.to_string(), scope),
                (Instant::now(), cached),
            );
        }
    }
}

impl Default for DiffCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
