//! Integration tests for the progress store and tracker (C5/C6) against a
//! real `SQLite` database, covering the resume path across two tracker
//! instances sharing the same store.

use ingest_core::Database;
use ingest_core::progress::{ProgressState, ProgressStore, ProgressTracker};

async fn seeded_db() -> Database {
    let db = Database::new_in_memory().await.expect("open in-memory db");
    sqlx::query("INSERT INTO data_source (name, kind) VALUES ('nhl_json_boxscore', 'api_json')")
        .execute(db.pool())
        .await
        .expect("seed data_source");
    db
}

#[tokio::test]
async fn full_lifecycle_persists_across_tracker_instances() {
    let db = seeded_db().await;

    {
        let store = ProgressStore::new(db.pool().clone());
        let tracker = ProgressTracker::new(store, 1, Some(2024_2025), None, None);
        tracker
            .register_items(&["2024020001".to_string(), "2024020002".to_string(), "2024020003".to_string()])
            .await
            .expect("register items");

        tracker.start_item("2024020001").await.expect("start");
        tracker.complete_item("2024020001", Some(2048), Some(120)).await.expect("complete");

        tracker.start_item("2024020002").await.expect("start");
        tracker.fail_item("2024020002", "connection reset").await.expect("fail");

        // 2024020003 is left pending, never started.
        assert_eq!(tracker.stats().success, 1);
        assert_eq!(tracker.stats().failed, 1);
        assert_eq!(tracker.stats().pending, 1);
    }

    // A fresh tracker (simulating a new process) resumes from the store.
    let store = ProgressStore::new(db.pool().clone());
    let resumed = ProgressTracker::new(store, 1, Some(2024_2025), None, None);
    let loaded = resumed.load_state().await.expect("load state");

    assert_eq!(loaded, 2, "only the failed and pending items are incomplete");
    assert!(!resumed.should_download("2024020001"), "completed item was not loaded, so it has no known state");
    assert!(resumed.should_download("2024020002"), "failed item should be retried");
    assert!(resumed.should_download("2024020003"), "pending item should be retried");
    assert_eq!(resumed.get_item_state("2024020002"), Some(ProgressState::Failed));

    let reset_count = resumed.reset_failed().await.expect("reset failed");
    assert_eq!(reset_count, 1);
    assert_eq!(resumed.get_item_state("2024020002"), Some(ProgressState::Pending));
}

#[tokio::test]
async fn reset_failed_is_scoped_to_source_and_season() {
    let db = seeded_db().await;
    sqlx::query("INSERT INTO data_source (name, kind) VALUES ('nhl_json_schedule', 'api_json')")
        .execute(db.pool())
        .await
        .expect("seed second data_source");

    let store_a = ProgressStore::new(db.pool().clone());
    let tracker_a = ProgressTracker::new(store_a, 1, Some(2024_2025), None, None);
    tracker_a.start_item("A").await.expect("start");
    tracker_a.fail_item("A", "boom").await.expect("fail");

    let store_b = ProgressStore::new(db.pool().clone());
    let tracker_b = ProgressTracker::new(store_b, 2, Some(2024_2025), None, None);
    tracker_b.start_item("B").await.expect("start");
    tracker_b.fail_item("B", "boom").await.expect("fail");

    let reset_count = tracker_a.reset_failed().await.expect("reset failed");
    assert_eq!(reset_count, 1, "resetting source 1 should not touch source 2's failed items");
    assert_eq!(tracker_b.get_item_state("B"), Some(ProgressState::Failed));
}
