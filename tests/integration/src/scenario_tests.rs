//! Review-and-push scenarios across the filesystem layer and the engine
//!
//! Each test drives a manifest-configured engine the way the CLI does:
//! diff, pick items, sync, diff again.

use std::fs;
use std::time::{Duration, SystemTime};

use envsync_core::model::{ChangeStatus, ItemRef};
use envsync_core::{Manifest, StagingEngine};
use envsync_test_utils::{TestEnvironments, schema};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn engine(envs: &TestEnvironments, extra: &str) -> StagingEngine {
    let manifest = Manifest::load(&envs.write_manifest(extra)).unwrap();
    StagingEngine::from_manifest(&manifest).unwrap()
}

fn touch(path: &std::path::Path, age: Duration) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - age).unwrap();
}

// =============================================================================
// Diff properties
// =============================================================================

#[test]
fn test_timestamps_and_mtimes_never_count_as_changes() {
    let envs = TestEnvironments::new();
    envs.write_both("wp-content/uploads/logo.png", [0x89, b'P', b'N', b'G', 1, 2, 3]);
    envs.write_both("index.php", "<?php echo 1;");
    touch(&envs.source_root().join("index.php"), Duration::from_secs(3600));
    touch(
        &envs.destination_root().join("wp-content/uploads/logo.png"),
        Duration::from_secs(86_400),
    );

    envs.exec_both(&schema::items(""));
    envs.exec_source("INSERT INTO items VALUES (1, 'Same', 'body', '2025-06-30 10:00:00');");
    envs.exec_destination("INSERT INTO items VALUES (1, 'Same', 'body', '2024-01-01 08:00:00');");

    let engine = engine(&envs, "[exclusions]\ncolumns = [\"modified_at\"]");
    assert!(engine.diff_files().unwrap().changes.is_empty());
    assert!(engine.diff_database().unwrap().changes.is_empty());
}

#[test]
fn test_excluded_paths_and_tables_are_invisible() {
    let envs = TestEnvironments::new();
    envs.write_source("wp-content/cache/page.html", "cached");
    envs.write_source("debug.log", "noise");
    envs.write_source("style.css", "a{}");
    envs.exec_both("CREATE TABLE sessions (id INTEGER PRIMARY KEY, token TEXT);");
    envs.exec_source("INSERT INTO sessions VALUES (1, 'abc');");

    let engine = engine(
        &envs,
        "[exclusions]\npaths = [\"wp-content/cache\"]\nextensions = [\"log\"]\ntables = [\"sessions\"]",
    );
    let files = engine.diff_files().unwrap();
    let paths: Vec<&str> = files.changes.iter().map(|c| c.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["style.css"]);
    assert!(engine.diff_database().unwrap().changes.is_empty());
}

#[test]
fn test_changes_come_back_in_stable_order() {
    let envs = TestEnvironments::new();
    for name in ["b.css", "a/z.js", "a/b.js", "c.txt"] {
        envs.write_source(name, name);
    }
    envs.exec_both(&schema::items(""));
    envs.exec_source("INSERT INTO items VALUES (10, 'ten', '', NULL), (2, 'two', '', NULL), (1, 'one', '', NULL);");
    let engine = engine(&envs, "");

    let files = engine.diff_files().unwrap();
    let paths: Vec<&str> = files.changes.iter().map(|c| c.relative_path.as_str()).collect();
    assert_eq!(paths, vec!["a/b.js", "a/z.js", "b.css", "c.txt"]);

    let rows = engine.diff_database().unwrap();
    let keys: Vec<&str> = rows.changes.iter().map(|c| c.primary_key_value.as_str()).collect();
    assert_eq!(keys, vec!["1", "2", "10"]);
}

// =============================================================================
// Review and push
// =============================================================================

#[test]
fn test_partial_push_of_a_mixed_change_set() {
    let envs = TestEnvironments::new();
    envs.write_source("style.css", "body { color: red; }");
    envs.write_destination("style.css", "body { color: blue; }");
    envs.write_source("app.js", "run();");
    envs.write_destination("legacy.js", "old();");
    envs.exec_both(&schema::items(""));
    envs.exec_both("INSERT INTO items VALUES (5, 'Old', 'b', NULL), (6, 'Gone', 'b', NULL);");
    envs.exec_source("UPDATE items SET title = 'New' WHERE id = 5; DELETE FROM items WHERE id = 6;");
    let engine = engine(&envs, "");

    let files = engine.diff_files().unwrap();
    assert_eq!(files.find("style.css").unwrap().status, ChangeStatus::Modified);
    assert_eq!(files.find("app.js").unwrap().status, ChangeStatus::Added);
    assert_eq!(files.find("legacy.js").unwrap().status, ChangeStatus::Deleted);
    let rows = engine.diff_database().unwrap();
    assert_eq!(rows.find("items", "5").unwrap().status, ChangeStatus::Modified);
    assert_eq!(rows.find("items", "6").unwrap().status, ChangeStatus::Deleted);

    // Push only the stylesheet and the row edit
    let report = engine
        .synchronize(&[ItemRef::file("style.css"), ItemRef::row("items", "5")])
        .unwrap();
    assert!(report.is_success(), "{report:?}");

    let files = engine.diff_files().unwrap();
    let remaining: Vec<&str> = files.changes.iter().map(|c| c.relative_path.as_str()).collect();
    assert_eq!(remaining, vec!["app.js", "legacy.js"]);
    let rows = engine.diff_database().unwrap();
    assert_eq!(rows.changes.len(), 1);
    assert_eq!(rows.changes[0].primary_key_value, "6");
}

#[test]
fn test_pushing_everything_converges() {
    let envs = TestEnvironments::new();
    envs.write_source("a/one.css", "1");
    envs.write_source("a/two.css", "2");
    envs.write_destination("a/three.css", "3");
    envs.exec_both(&schema::items(""));
    envs.exec_source("INSERT INTO items VALUES (1, 'x', NULL, NULL);");
    envs.exec_destination("INSERT INTO items VALUES (2, 'y', NULL, NULL);");
    let engine = engine(&envs, "");

    let mut selected: Vec<ItemRef> = engine
        .diff_files()
        .unwrap()
        .changes
        .iter()
        .map(|c| ItemRef::file(c.relative_path.clone()))
        .collect();
    selected.extend(
        engine
            .diff_database()
            .unwrap()
            .changes
            .iter()
            .map(|c| ItemRef::row(c.table.clone(), c.primary_key_value.clone())),
    );
    assert_eq!(selected.len(), 5);

    let report = engine.synchronize(&selected).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert!(engine.diff_files().unwrap().changes.is_empty());
    assert!(engine.diff_database().unwrap().changes.is_empty());
    assert!(!envs.destination_has("a/three.css"));
    assert_eq!(
        envs.query_destination("SELECT group_concat(id) FROM items").as_deref(),
        Some("1")
    );
}

#[test]
fn test_sync_refreshes_baselines_for_later_conflicts() {
    let envs = TestEnvironments::new();
    envs.write_source("style.css", "v1");
    let engine = engine(&envs, "");

    // First push records the destination state as the baseline
    assert!(engine.synchronize(&[ItemRef::file("style.css")]).unwrap().is_success());

    envs.write_source("style.css", "v2");
    envs.write_destination("style.css", "hotfix");
    let conflicts = engine.detect_conflicts(&[ItemRef::file("style.css")]).unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].item_ref, ItemRef::file("style.css"));
}

// =============================================================================
// Properties
// =============================================================================

fn tree() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-c]/[a-d]\\.(css|txt)", "[a-z\r\n]{0,12}"), 0..6)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_file_sync_is_idempotent(source in tree(), destination in tree()) {
        let envs = TestEnvironments::new();
        for (path, content) in &source {
            envs.write_source(path, content);
        }
        for (path, content) in &destination {
            envs.write_destination(path, content);
        }
        let engine = engine(&envs, "");

        let selected: Vec<ItemRef> = engine
            .diff_files()
            .unwrap()
            .changes
            .iter()
            .map(|c| ItemRef::file(c.relative_path.clone()))
            .collect();

        let first = engine.synchronize(&selected).unwrap();
        prop_assert!(first.is_success());
        prop_assert!(engine.diff_files().unwrap().changes.is_empty());

        let second = engine.synchronize(&selected).unwrap();
        prop_assert!(second.results.iter().all(|r| r.message == "already in sync"));
    }
}
