//! Conflict detection and resolution through the engine

use std::sync::Arc;

use envsync_core::config::EngineConfig;
use envsync_core::model::{ItemRef, ItemValue};
use envsync_core::store::SqliteStore;
use envsync_core::{Decision, Endpoint, Environment, Error, Resolution, StagingEngine};
use envsync_test_utils::{TestEnvironments, schema};

fn engine_with(envs: &TestEnvironments, config: EngineConfig) -> StagingEngine {
    let source = Endpoint::new(
        Environment::new("staging", envs.source_root(), ""),
        Arc::new(SqliteStore::open(&envs.source_db()).unwrap()),
    );
    let destination = Endpoint::new(
        Environment::new("production", envs.destination_root(), ""),
        Arc::new(SqliteStore::open(&envs.destination_db()).unwrap()),
    );
    StagingEngine::new(source, destination, config, envs.state_dir()).unwrap()
}

fn engine(envs: &TestEnvironments) -> StagingEngine {
    engine_with(envs, EngineConfig::default())
}

/// Both sides start equal, a baseline is taken, then both edit style.css.
fn diverged_stylesheet() -> (TestEnvironments, StagingEngine) {
    let envs = TestEnvironments::new();
    envs.write_both("style.css", "a{}\n");
    let engine = engine(&envs);
    engine.capture_baseline().unwrap();

    envs.write_source("style.css", "b{}\n");
    envs.write_destination("style.css", "c{}\n");
    (envs, engine)
}

/// Row 5 starts equal on both sides, then both edit its title.
fn diverged_row(envs: &TestEnvironments, engine: &StagingEngine) -> String {
    envs.exec_both(&schema::items(""));
    envs.exec_both("INSERT INTO items VALUES (5, 'Original', 'body', 't0');");
    engine.capture_baseline().unwrap();

    envs.exec_source("UPDATE items SET title = 'Staged', modified_at = 'src-ts' WHERE id = 5;");
    envs.exec_destination("UPDATE items SET title = 'Hotfix', modified_at = 'dst-ts' WHERE id = 5;");

    let detected = engine.detect_conflicts(&[ItemRef::row("items", "5")]).unwrap();
    assert_eq!(detected.len(), 1);
    detected[0].id.to_string()
}

fn blocked_conflict_id(engine: &StagingEngine) -> String {
    let item = ItemRef::file("style.css");
    let report = engine.synchronize(std::slice::from_ref(&item)).unwrap();
    let result = report.result_for(&item).unwrap();
    assert!(!result.is_success());
    assert!(result.message.contains("Unresolved conflict"), "{}", result.message);

    let conflicts = engine.conflicts().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert!(!conflicts[0].resolved);
    conflicts[0].id.to_string()
}

mod detection_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_baseline_means_no_conflict() {
        let envs = TestEnvironments::new();
        envs.write_source("style.css", "b{}");
        envs.write_destination("style.css", "c{}");
        let engine = engine(&envs);

        let detected = engine.detect_conflicts(&[ItemRef::file("style.css")]).unwrap();
        assert!(detected.is_empty());
    }

    #[test]
    fn test_untouched_destination_is_not_a_conflict() {
        let envs = TestEnvironments::new();
        envs.write_both("style.css", "a{}");
        let engine = engine(&envs);
        engine.capture_baseline().unwrap();
        envs.write_source("style.css", "b{}");

        let detected = engine.detect_conflicts(&[ItemRef::file("style.css")]).unwrap();
        assert!(detected.is_empty());
    }

    #[test]
    fn test_diverged_destination_is_detected_once() {
        let (_envs, engine) = diverged_stylesheet();
        let item = ItemRef::file("style.css");

        let first = engine.detect_conflicts(std::slice::from_ref(&item)).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].item_ref, item);
        assert!(first[0].baseline_value.is_some());

        let again = engine.detect_conflicts(std::slice::from_ref(&item)).unwrap();
        assert!(again.is_empty());
        assert_eq!(engine.conflicts().unwrap().len(), 1);
    }

    #[test]
    fn test_new_destination_value_yields_new_conflict() {
        let (envs, engine) = diverged_stylesheet();
        let item = ItemRef::file("style.css");
        engine.detect_conflicts(std::slice::from_ref(&item)).unwrap();

        envs.write_destination("style.css", "d{}\n");
        let detected = engine.detect_conflicts(std::slice::from_ref(&item)).unwrap();
        assert_eq!(detected.len(), 1);
        assert_eq!(engine.conflicts().unwrap().len(), 2);
    }

    #[test]
    fn test_reverted_destination_after_a_sync_is_a_new_conflict() {
        let (envs, engine) = diverged_stylesheet();
        let item = ItemRef::file("style.css");
        let id = blocked_conflict_id(&engine);
        engine.resolve_conflict(&id, Decision::KeepSource).unwrap();
        assert!(engine.synchronize(std::slice::from_ref(&item)).unwrap().is_success());
        assert_eq!(envs.read_destination("style.css"), "b{}\n");

        // Production goes back to its old hotfix while staging moves on
        envs.write_destination("style.css", "c{}\n");
        envs.write_source("style.css", "e{}\n");

        let detected = engine.detect_conflicts(std::slice::from_ref(&item)).unwrap();
        assert_eq!(detected.len(), 1);
        assert_ne!(detected[0].id.to_string(), id);

        let report = engine.synchronize(std::slice::from_ref(&item)).unwrap();
        let result = report.result_for(&item).unwrap();
        assert!(!result.is_success());
        assert!(result.message.contains("Unresolved conflict"), "{}", result.message);
        assert_eq!(envs.read_destination("style.css"), "c{}\n");
    }

    #[test]
    fn test_unknown_group_is_invalid() {
        let envs = TestEnvironments::new();
        let engine = engine(&envs);
        let result = engine.detect_conflicts(&[ItemRef::group("posts:1")]);
        assert!(matches!(result, Err(Error::InvalidItemRef { .. })));
    }
}

mod resolution_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_keep_source_pushes_the_staged_file() {
        let (envs, engine) = diverged_stylesheet();
        let id = blocked_conflict_id(&engine);

        let outcome = engine.resolve_conflict(&id, Decision::KeepSource).unwrap();
        assert_eq!(outcome.resolution, Resolution::Source);

        let report = engine.synchronize(&[ItemRef::file("style.css")]).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(envs.read_destination("style.css"), "b{}\n");

        // Baseline now matches the destination, nothing left to do
        let again = engine.synchronize(&[ItemRef::file("style.css")]).unwrap();
        assert_eq!(again.results[0].message, "already in sync");
    }

    #[test]
    fn test_keep_destination_leaves_the_file() {
        let (envs, engine) = diverged_stylesheet();
        let id = blocked_conflict_id(&engine);

        engine.resolve_conflict(&id, Decision::KeepDestination).unwrap();
        let report = engine.synchronize(&[ItemRef::file("style.css")]).unwrap();
        assert!(report.is_success());
        assert_eq!(report.results[0].message, "kept destination value");
        assert_eq!(envs.read_destination("style.css"), "c{}\n");
    }

    #[test]
    fn test_keep_destination_holds_across_syncs() {
        let (envs, engine) = diverged_stylesheet();
        let item = ItemRef::file("style.css");
        let id = blocked_conflict_id(&engine);
        engine.resolve_conflict(&id, Decision::KeepDestination).unwrap();

        for _ in 0..2 {
            let report = engine.synchronize(std::slice::from_ref(&item)).unwrap();
            assert!(report.is_success(), "{report:?}");
            assert_eq!(report.results[0].message, "kept destination value");
        }
        assert_eq!(envs.read_destination("style.css"), "c{}\n");
        assert_eq!(engine.conflicts().unwrap().len(), 1);
    }

    #[test]
    fn test_keep_source_overwrites_a_diverged_row() {
        let envs = TestEnvironments::new();
        let engine = engine(&envs);
        let id = diverged_row(&envs, &engine);

        engine.resolve_conflict(&id, Decision::KeepSource).unwrap();
        let report = engine.synchronize(&[ItemRef::row("items", "5")]).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(
            envs.query_destination("SELECT title FROM items WHERE id = 5").as_deref(),
            Some("Staged")
        );
    }

    #[test]
    fn test_keep_destination_leaves_a_diverged_row() {
        let envs = TestEnvironments::new();
        let engine = engine(&envs);
        let id = diverged_row(&envs, &engine);

        engine.resolve_conflict(&id, Decision::KeepDestination).unwrap();
        let report = engine.synchronize(&[ItemRef::row("items", "5")]).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.results[0].message, "kept destination value");
        assert_eq!(
            envs.query_destination("SELECT title FROM items WHERE id = 5").as_deref(),
            Some("Hotfix")
        );
        assert_eq!(
            envs.query_source("SELECT title FROM items WHERE id = 5").as_deref(),
            Some("Staged")
        );
    }

    #[test]
    fn test_custom_row_leaves_excluded_columns_alone() {
        let envs = TestEnvironments::new();
        let mut config = EngineConfig::default();
        config.exclusions.columns = vec!["modified_at".into()];
        let engine = engine_with(&envs, config);
        let id = diverged_row(&envs, &engine);

        let custom = ItemValue::row_from_json(&serde_json::json!({"title": "C"})).unwrap();
        engine.resolve_conflict(&id, Decision::Custom(custom)).unwrap();
        let report = engine.synchronize(&[ItemRef::row("items", "5")]).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(
            envs.query_destination("SELECT title FROM items WHERE id = 5").as_deref(),
            Some("C")
        );
        assert_eq!(
            envs.query_destination("SELECT modified_at FROM items WHERE id = 5").as_deref(),
            Some("dst-ts")
        );
    }

    #[test]
    fn test_custom_content_is_written() {
        let (envs, engine) = diverged_stylesheet();
        let id = blocked_conflict_id(&engine);

        engine
            .resolve_conflict(&id, Decision::Custom(ItemValue::Content(b"merged{}\n".to_vec())))
            .unwrap();
        let report = engine.synchronize(&[ItemRef::file("style.css")]).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(envs.read_destination("style.css"), "merged{}\n");
    }

    #[test]
    fn test_custom_row_is_merged_over_the_source_row() {
        let envs = TestEnvironments::new();
        envs.exec_both(&schema::items(""));
        envs.exec_both("INSERT INTO items VALUES (5, 'Original', 'body', NULL);");
        let engine = engine(&envs);
        engine.capture_baseline().unwrap();

        envs.exec_source("UPDATE items SET title = 'Staged', body = 'new body' WHERE id = 5;");
        envs.exec_destination("UPDATE items SET title = 'Hotfix' WHERE id = 5;");

        let item = ItemRef::row("items", "5");
        let detected = engine.detect_conflicts(std::slice::from_ref(&item)).unwrap();
        assert_eq!(detected.len(), 1);

        let custom = ItemValue::row_from_json(&serde_json::json!({"title": "Merged"})).unwrap();
        engine
            .resolve_conflict(&detected[0].id.to_string(), Decision::Custom(custom))
            .unwrap();

        let report = engine.synchronize(std::slice::from_ref(&item)).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(
            envs.query_destination("SELECT title FROM items WHERE id = 5").as_deref(),
            Some("Merged")
        );
        assert_eq!(
            envs.query_destination("SELECT body FROM items WHERE id = 5").as_deref(),
            Some("new body")
        );
    }

    #[test]
    fn test_custom_value_must_match_item_type() {
        let (_envs, engine) = diverged_stylesheet();
        let id = blocked_conflict_id(&engine);

        let custom = ItemValue::row_from_json(&serde_json::json!({"title": "x"})).unwrap();
        let result = engine.resolve_conflict(&id, Decision::Custom(custom));
        assert!(matches!(result, Err(Error::InvalidResolution { .. })));
    }

    #[test]
    fn test_unknown_conflict_id() {
        let envs = TestEnvironments::new();
        let engine = engine(&envs);

        for id in ["not-a-uuid", "6f1c1d3e-6a49-4c1e-9d2c-3a8c2b1f0e11"] {
            let result = engine.resolve_conflict(id, Decision::KeepSource);
            assert!(matches!(result, Err(Error::ConflictNotFound { .. })), "{id}");
        }
    }
}
