//! Integration tests for the persistent dedup set and result history.
//!
//! Both live in the same SQLite file; these tests reopen it to check that
//! state survives across runs.

use std::sync::Arc;
use std::time::Duration;

use linkrelay_core::{
    Database, DedupStore, JobError, Outcome, ResultHistory, ResultRecord, SqliteKvStore,
};
use tempfile::TempDir;

fn open_store(db: &Database, namespace: &str) -> DedupStore {
    DedupStore::new(Arc::new(SqliteKvStore::new(db.clone())), namespace)
}

#[tokio::test]
async fn test_recorded_links_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("state").join("linkrelay.db");

    {
        let db = Database::new(&db_path).await.unwrap();
        let store = open_store(&db, "links");
        assert!(store.record_if_new("https://terabox.com/s/1abc").await.unwrap());
        assert!(store.record_if_new("https://1024tera.com/s/1def").await.unwrap());
        db.close().await;
    }

    let db = Database::new(&db_path).await.unwrap();
    let store = open_store(&db, "links");
    assert_eq!(store.count().await.unwrap(), 2);
    assert!(!store.is_new("https://terabox.com/s/1abc").await.unwrap());
    assert!(
        !store
            .record_if_new("https://TERABOX.com/s/1abc/")
            .await
            .unwrap(),
        "a different spelling of a recorded link is still a duplicate"
    );
    assert!(store.is_new("https://terabox.com/s/1zzz").await.unwrap());
}

#[tokio::test]
async fn test_bulk_add_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("linkrelay.db")).await.unwrap();
    let store = open_store(&db, "links");

    let links = [
        "https://terabox.com/s/1a",
        "https://terabox.com/s/1b",
        "https://terabox.com/s/1a",
    ];
    let first = store.bulk_add(links).await.unwrap();
    assert_eq!(first.added, 2);
    assert_eq!(first.duplicates_skipped, 1);
    assert_eq!(first.total_after, 2);

    let second = store.bulk_add(links).await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.duplicates_skipped, 3);
    assert_eq!(second.total_after, 2);

    assert_eq!(
        store.links().await.unwrap(),
        vec!["https://terabox.com/s/1a", "https://terabox.com/s/1b"]
    );
}

#[tokio::test]
async fn test_namespaces_are_independent() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("linkrelay.db")).await.unwrap();
    let work = open_store(&db, "work");
    let home = open_store(&db, "home");

    work.record_if_new("https://terabox.com/s/1shared").await.unwrap();
    assert!(home.is_new("https://terabox.com/s/1shared").await.unwrap());

    assert_eq!(work.clear().await.unwrap(), 1);
    assert_eq!(work.count().await.unwrap(), 0);
    assert_eq!(home.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_history_tracks_latest_outcome_per_link() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("linkrelay.db");
    let elapsed = Duration::from_millis(40);

    {
        let db = Database::new(&db_path).await.unwrap();
        let history = ResultHistory::new(db.clone());
        history
            .append(&ResultRecord::settled(
                "https://terabox.com/s/1a",
                Outcome::Failed,
                Some(&JobError::NoFiles),
                elapsed,
            ))
            .await
            .unwrap();
        history
            .append(&ResultRecord::settled(
                "https://terabox.com/s/1b",
                Outcome::Cancelled,
                Some(&JobError::Cancelled),
                elapsed,
            ))
            .await
            .unwrap();
        history
            .append(&ResultRecord::settled(
                "https://terabox.com/s/1c",
                Outcome::Duplicate,
                None,
                elapsed,
            ))
            .await
            .unwrap();
        // A later success supersedes the earlier failure.
        history
            .append(&ResultRecord::settled(
                "https://terabox.com/s/1a",
                Outcome::Succeeded,
                None,
                elapsed,
            ))
            .await
            .unwrap();
        db.close().await;
    }

    let db = Database::new(&db_path).await.unwrap();
    let history = ResultHistory::new(db);

    let stats = history.stats().await.unwrap();
    assert_eq!(stats.total, 4);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.duplicate, 1);

    assert_eq!(
        history.failed_links(10, 0).await.unwrap(),
        vec!["https://terabox.com/s/1b"]
    );

    let recent = history.recent(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].outcome, Outcome::Succeeded);
    assert_eq!(recent[1].link, "https://terabox.com/s/1c");
}
