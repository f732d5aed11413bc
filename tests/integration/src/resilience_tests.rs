//! Failure handling: locks, aborts, unavailable destinations, shared caches

use std::sync::Arc;

use envsync_core::config::EngineConfig;
use envsync_core::model::{ItemRef, Row};
use envsync_core::store::{RowStore, SqliteStore, TableSchema};
use envsync_core::{
    AbortHandle, DiffCache, Endpoint, Environment, Error, Result, StagingEngine, SyncOptions,
};
use envsync_fs::SyncLock;
use envsync_test_utils::{TestEnvironments, schema};
use pretty_assertions::assert_eq;

fn endpoints(envs: &TestEnvironments) -> (Endpoint, Endpoint) {
    let source = Endpoint::new(
        Environment::new("staging", envs.source_root(), ""),
        Arc::new(SqliteStore::open(&envs.source_db()).unwrap()),
    );
    let destination = Endpoint::new(
        Environment::new("production", envs.destination_root(), ""),
        Arc::new(SqliteStore::open(&envs.destination_db()).unwrap()),
    );
    (source, destination)
}

fn engine_with(envs: &TestEnvironments, config: EngineConfig) -> StagingEngine {
    let (source, destination) = endpoints(envs);
    StagingEngine::new(source, destination, config, envs.state_dir()).unwrap()
}

/// Reads work; every write reports the database as gone.
struct ReadOnlyOutage {
    inner: SqliteStore,
}

impl ReadOnlyOutage {
    fn outage() -> Error {
        Error::DestinationUnavailable {
            message: "database server went away".into(),
        }
    }
}

impl RowStore for ReadOnlyOutage {
    fn tables(&self) -> Result<Vec<String>> {
        self.inner.tables()
    }
    fn schema(&self, table: &str) -> Result<TableSchema> {
        self.inner.schema(table)
    }
    fn primary_keys(&self, table: &str, key_column: &str) -> Result<Vec<String>> {
        self.inner.primary_keys(table, key_column)
    }
    fn fetch_row(&self, table: &str, key_column: &str, key: &str) -> Result<Option<Row>> {
        self.inner.fetch_row(table, key_column, key)
    }
    fn insert_row(&self, _table: &str, _row: &Row) -> Result<()> {
        Err(Self::outage())
    }
    fn update_row(&self, _: &str, _: &str, _: &str, _: &Row) -> Result<usize> {
        Err(Self::outage())
    }
    fn delete_row(&self, _: &str, _: &str, _: &str) -> Result<usize> {
        Err(Self::outage())
    }
}

#[test]
fn test_unavailable_database_stops_the_batch() {
    let envs = TestEnvironments::new();
    envs.exec_both(&schema::items(""));
    envs.exec_source("INSERT INTO items VALUES (1, 'a', NULL, NULL), (2, 'b', NULL, NULL);");
    envs.write_source("a.css", "a{}");

    let (source, _) = endpoints(&envs);
    let destination = Endpoint::new(
        Environment::new("production", envs.destination_root(), ""),
        Arc::new(ReadOnlyOutage {
            inner: SqliteStore::open(&envs.destination_db()).unwrap(),
        }),
    );
    let engine =
        StagingEngine::new(source, destination, EngineConfig::default(), envs.state_dir()).unwrap();

    let report = engine
        .synchronize(&[
            ItemRef::row("items", "1"),
            ItemRef::row("items", "2"),
            ItemRef::file("a.css"),
        ])
        .unwrap();

    assert!(report.aborted);
    assert_eq!(report.results.len(), 3);
    assert!(report.results[0].message.contains("database server went away"));
    assert_eq!(report.results[1].message, "destination unavailable");
    assert_eq!(report.results[2].message, "destination unavailable");
    assert!(!envs.destination_has("a.css"));
}

#[test]
fn test_missing_destination_root_stops_the_batch() {
    let envs = TestEnvironments::new();
    envs.write_source("a.css", "a{}");
    envs.write_source("b.css", "b{}");
    let engine = engine_with(&envs, EngineConfig::default());
    std::fs::remove_dir_all(envs.destination_root()).unwrap();

    let report = engine
        .synchronize(&[ItemRef::file("a.css"), ItemRef::file("b.css")])
        .unwrap();
    assert!(report.aborted);
    assert_eq!(report.failed().count(), 2);
    assert_eq!(report.results[1].message, "destination unavailable");
}

#[test]
fn test_held_lock_reports_sync_in_progress() {
    let envs = TestEnvironments::new();
    envs.write_source("a.css", "a{}");
    let mut config = EngineConfig::default();
    config.sync.lock_timeout_secs = 0;
    let engine = engine_with(&envs, config);

    let _held = SyncLock::try_acquire(&engine.lock_path()).unwrap();
    let result = engine.synchronize(&[ItemRef::file("a.css")]);
    assert!(matches!(result, Err(Error::SyncInProgress { .. })));

    // Dry runs do not need the lock
    let dry = engine
        .synchronize_with_options(&[ItemRef::file("a.css")], &SyncOptions::dry_run())
        .unwrap();
    assert!(dry.is_success());
}

#[test]
fn test_aborted_run_reports_every_item() {
    let envs = TestEnvironments::new();
    envs.write_source("a.css", "a{}");
    envs.write_source("b.css", "b{}");
    let engine = engine_with(&envs, EngineConfig::default());

    let abort = AbortHandle::new();
    abort.abort();
    let options = SyncOptions {
        abort,
        ..SyncOptions::default()
    };
    let report = engine
        .synchronize_with_options(&[ItemRef::file("a.css"), ItemRef::file("b.css")], &options)
        .unwrap();

    assert!(report.aborted);
    for result in &report.results {
        assert_eq!(result.message, "sync aborted before this item");
    }
    assert!(!envs.destination_has("a.css"));
}

#[test]
fn test_shared_cache_is_invalidated_by_sync() {
    let envs = TestEnvironments::new();
    envs.write_source("a.css", "a{}");
    let cache = Arc::new(DiffCache::default());
    let reviewer = engine_with(&envs, EngineConfig::default()).with_cache(Arc::clone(&cache));
    let pusher = engine_with(&envs, EngineConfig::default()).with_cache(Arc::clone(&cache));

    assert_eq!(reviewer.diff_files().unwrap().changes.len(), 1);

    // A change on disk is not seen while the entry is fresh
    envs.write_source("b.css", "b{}");
    assert_eq!(reviewer.diff_files().unwrap().changes.len(), 1);

    // A sync through any engine sharing the cache drops the entry
    let report = pusher.synchronize(&[ItemRef::file("a.css")]).unwrap();
    assert!(report.is_success());
    let fresh = reviewer.diff_files().unwrap();
    let paths: Vec<&str> = fresh.changes.iter().map(|c| c.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["b.css"]);
}

#[test]
fn test_concurrent_syncs_do_not_interleave() {
    let envs = TestEnvironments::new();
    for i in 0..8 {
        envs.write_source(&format!("f{i}.css"), format!("{i}"));
    }
    let first = engine_with(&envs, EngineConfig::default());
    let second = engine_with(&envs, EngineConfig::default());
    let selected: Vec<ItemRef> = (0..8).map(|i| ItemRef::file(format!("f{i}.css"))).collect();

    std::thread::scope(|scope| {
        let a = scope.spawn(|| first.synchronize(&selected));
        let b = scope.spawn(|| second.synchronize(&selected));
        for report in [a.join().unwrap(), b.join().unwrap()] {
            assert!(report.unwrap().is_success());
        }
    });

    for i in 0..8 {
        assert_eq!(envs.read_destination(&format!("f{i}.css")), format!("{i}"));
    }
}
