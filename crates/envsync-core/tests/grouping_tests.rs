//! Grouping of row changes into content units, and group-level sync

use std::sync::Arc;

use envsync_core::config::EngineConfig;
use envsync_core::model::ItemRef;
use envsync_core::store::SqliteStore;
use envsync_core::{Endpoint, Environment, StagingEngine};
use envsync_test_utils::{TestEnvironments, schema};
use pretty_assertions::assert_eq;

fn engine(envs: &TestEnvironments) -> StagingEngine {
    let source = Endpoint::new(
        Environment::new("staging", envs.source_root(), "wpstg0_"),
        Arc::new(SqliteStore::open(&envs.source_db()).unwrap()),
    );
    let destination = Endpoint::new(
        Environment::new("production", envs.destination_root(), "wp_"),
        Arc::new(SqliteStore::open(&envs.destination_db()).unwrap()),
    );
    StagingEngine::new(source, destination, EngineConfig::default(), envs.state_dir()).unwrap()
}

/// A new page on staging with a revision, an image, metadata and a comment,
/// plus an unrelated option change.
fn staged_page() -> TestEnvironments {
    let envs = TestEnvironments::new();
    envs.exec_source(&schema::content("wpstg0_"));
    envs.exec_destination(&schema::content("wp_"));
    envs.exec_source(
        "INSERT INTO wpstg0_posts VALUES
            (10, 0, 'page', 'About', 'hello', '2025-01-01'),
            (11, 10, 'revision', 'About', 'draft', '2025-01-01'),
            (12, 10, 'attachment', 'team.jpg', '', '2025-01-01');
         INSERT INTO wpstg0_postmeta VALUES (100, 10, '_wp_page_template', 'default');
         INSERT INTO wpstg0_comments VALUES (200, 10, 'Nice page');
         INSERT INTO wpstg0_options VALUES (1, 'blogname', 'Staged');",
    );
    envs.exec_destination("INSERT INTO wp_options VALUES (1, 'blogname', 'Live');");
    envs
}

#[test]
fn test_page_rows_form_one_group() {
    let envs = staged_page();
    let engine = engine(&envs);

    let grouped = engine.grouped_changes().unwrap();
    assert_eq!(grouped.groups.len(), 1);

    let group = grouped.find("posts:10").unwrap();
    assert_eq!(group.kind, "page");
    assert_eq!(group.title, "About");
    assert_eq!(group.row_count(), 5);
    assert_eq!(group.attachments[0].primary_key_value, "12");
    assert_eq!(group.members["posts"][0].primary_key_value, "11");
    assert_eq!(group.members["postmeta"][0].primary_key_value, "100");
    assert_eq!(group.members["comments"][0].primary_key_value, "200");

    assert_eq!(grouped.standalone.len(), 1);
    assert_eq!(grouped.standalone[0].table, "options");
}

#[test]
fn test_every_changed_row_lands_exactly_once() {
    let envs = staged_page();
    let engine = engine(&envs);

    let report = engine.diff_database().unwrap();
    let grouped = engine.group(&report.changes);

    let mut seen: Vec<(String, String)> = grouped
        .groups
        .iter()
        .flat_map(|g| g.rows())
        .chain(grouped.standalone.iter())
        .map(|c| (c.table.clone(), c.primary_key_value.clone()))
        .collect();
    seen.sort();
    let mut expected: Vec<(String, String)> = report
        .changes
        .iter()
        .map(|c| (c.table.clone(), c.primary_key_value.clone()))
        .collect();
    expected.sort();
    assert_eq!(seen, expected);
}

#[test]
fn test_syncing_a_group_applies_all_its_rows() {
    let envs = staged_page();
    let engine = engine(&envs);

    let report = engine.synchronize(&[ItemRef::group("posts:10")]).unwrap();
    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.results.len(), 5);

    assert_eq!(
        envs.query_destination("SELECT COUNT(*) FROM wp_posts").as_deref(),
        Some("3")
    );
    assert_eq!(
        envs.query_destination("SELECT meta_value FROM wp_postmeta WHERE meta_id = 100")
            .as_deref(),
        Some("default")
    );
    // The option change was not selected
    assert_eq!(
        envs.query_destination("SELECT option_value FROM wp_options WHERE option_id = 1")
            .as_deref(),
        Some("Live")
    );

    let remaining = engine.grouped_changes().unwrap();
    assert!(remaining.groups.is_empty());
    assert_eq!(remaining.standalone.len(), 1);
}
