// ABOUTME: Integration tests for incremental sync between SQLite databases
// ABOUTME: Checks offset-based resumption, no-op runs, and a destination ahead of the source

use std::path::Path;

use rusqlite::Connection;
use table_replicator::commands;
use table_replicator::config::{EndpointConfig, MigrationOptions, ReplicationConfig};
use table_replicator::{ReplicationMode, Verification};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const EVENTS_DDL: &str =
    "CREATE TABLE events (id INTEGER PRIMARY KEY, kind TEXT NOT NULL, at TIMESTAMP)";

fn seed_events(path: &Path, ids: std::ops::RangeInclusive<i64>) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(EVENTS_DDL).unwrap();
    let tx = conn.unchecked_transaction().unwrap();
    for id in ids {
        tx.execute(
            "INSERT INTO events (id, kind, at) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, format!("kind-{}", id % 3), "2024-05-01 12:00:00"],
        )
        .unwrap();
    }
    tx.commit().unwrap();
}

fn ids(path: &Path) -> Vec<i64> {
    let conn = Connection::open(path).unwrap();
    let mut stmt = conn.prepare("SELECT id FROM events ORDER BY id").unwrap();
    let ids = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<Result<Vec<i64>, _>>()
        .unwrap();
    ids
}

fn config(source: &Path, destination: &Path) -> ReplicationConfig {
    ReplicationConfig {
        source: EndpointConfig::sqlite(source.to_string_lossy(), "events"),
        destination: EndpointConfig::sqlite(destination.to_string_lossy(), "events"),
        migration: MigrationOptions {
            batch_size: 25,
            show_progress: false,
            ..MigrationOptions::default()
        },
    }
}

#[tokio::test]
async fn test_sync_copies_rows_beyond_destination_count() {
    let dir = TempDir::new().unwrap();
    let (src, dst) = (dir.path().join("src.db"), dir.path().join("dst.db"));
    seed_events(&src, 1..=100);
    seed_events(&dst, 1..=40);

    let report = commands::sync(&config(&src, &dst), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.mode, ReplicationMode::Sync);
    assert_eq!(report.destination_count_before, 40);
    assert_eq!(report.start_offset, 40);
    assert_eq!(report.rows_transferred, 60);
    assert_eq!(report.batches, 3);
    assert_eq!(report.final_source_count, Some(100));
    assert_eq!(report.final_destination_count, Some(100));
    assert_eq!(report.verification, Verification::Verified);
    assert_eq!(ids(&dst), (1..=100).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_sync_when_already_in_sync_copies_nothing() {
    let dir = TempDir::new().unwrap();
    let (src, dst) = (dir.path().join("src.db"), dir.path().join("dst.db"));
    seed_events(&src, 1..=50);
    seed_events(&dst, 1..=50);

    let report = commands::sync(&config(&src, &dst), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rows_transferred, 0);
    assert_eq!(report.batches, 0);
    assert!(report.is_verified());
    assert_eq!(ids(&dst).len(), 50);
}

#[tokio::test]
async fn test_sync_destination_ahead_is_reported_not_repaired() {
    let dir = TempDir::new().unwrap();
    let (src, dst) = (dir.path().join("src.db"), dir.path().join("dst.db"));
    seed_events(&src, 1..=40);
    seed_events(&dst, 1..=100);

    let report = commands::sync(&config(&src, &dst), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.rows_transferred, 0);
    assert_eq!(report.verification, Verification::Mismatch { delta: 60 });
    assert!(!report.is_verified());
    assert_eq!(ids(&dst).len(), 100);
}

#[tokio::test]
async fn test_sync_into_missing_table_copies_everything() {
    let dir = TempDir::new().unwrap();
    let (src, dst) = (dir.path().join("src.db"), dir.path().join("dst.db"));
    seed_events(&src, 1..=30);

    let report = commands::sync(&config(&src, &dst), CancellationToken::new())
        .await
        .unwrap();

    assert!(report.table_created);
    assert_eq!(report.start_offset, 0);
    assert_eq!(report.rows_transferred, 30);
    assert_eq!(ids(&dst), (1..=30).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_sync_ignores_truncate_and_second_run_is_noop() {
    let dir = TempDir::new().unwrap();
    let (src, dst) = (dir.path().join("src.db"), dir.path().join("dst.db"));
    seed_events(&src, 1..=60);
    seed_events(&dst, 1..=10);

    let mut cfg = config(&src, &dst);
    cfg.migration.truncate_destination = true;
    let first = commands::sync(&cfg, CancellationToken::new())
        .await
        .unwrap();
    assert!(!first.truncated);
    assert_eq!(first.rows_transferred, 50);

    let second = commands::sync(&cfg, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.rows_transferred, 0);
    assert!(second.is_verified());
    assert_eq!(ids(&dst).len(), 60);
}
