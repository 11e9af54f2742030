// ABOUTME: Integration tests against a live MySQL or MariaDB server
// ABOUTME: Run with TEST_MYSQL_URL set and `--ignored`

use std::env;

use mysql_async::prelude::*;
use table_replicator::commands;
use table_replicator::config::{EndpointConfig, MigrationOptions, ReplicationConfig};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Helper to get the test database URL from environment
fn get_test_url() -> Option<String> {
    env::var("TEST_MYSQL_URL").ok()
}

/// Build an endpoint from a mysql:// URL
fn endpoint(raw: &str, table: &str) -> EndpointConfig {
    let url = url::Url::parse(raw).expect("invalid test URL");
    EndpointConfig {
        db_type: "mysql".to_string(),
        host: url.host_str().map(str::to_string),
        port: url.port(),
        database: url.path().trim_start_matches('/').to_string(),
        username: Some(url.username().to_string()).filter(|u| !u.is_empty()),
        password: url.password().map(str::to_string),
        table: table.to_string(),
        connect_retries: 0,
        encrypt: false,
        trust_server_certificate: false,
    }
}

async fn conn(url: &str) -> mysql_async::Conn {
    let opts = mysql_async::Opts::from_url(url).expect("invalid test URL");
    mysql_async::Conn::new(opts)
        .await
        .expect("Failed to connect")
}

async fn count(conn: &mut mysql_async::Conn, table: &str) -> i64 {
    conn.query_first::<i64, _>(format!("SELECT COUNT(*) FROM `{}`", table))
        .await
        .expect("count failed")
        .unwrap_or(0)
}

fn options(batch_size: u64) -> MigrationOptions {
    MigrationOptions {
        batch_size,
        show_progress: false,
        ..MigrationOptions::default()
    }
}

/// Test: typed rows survive a MySQL to MySQL migration, then a sync appends new rows
#[tokio::test]
#[ignore]
async fn test_mysql_migrate_then_sync() {
    let url = get_test_url().expect("TEST_MYSQL_URL must be set");
    let mut db = conn(&url).await;

    db.query_drop(
        r#"
        DROP TABLE IF EXISTS `replicator_src`;
        DROP TABLE IF EXISTS `replicator_dst`;
        CREATE TABLE `replicator_src` (
            id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            sku VARCHAR(32) NOT NULL,
            price DECIMAL(10,2) DEFAULT 0,
            active TINYINT(1),
            shipped DATE,
            updated_at DATETIME(6),
            payload BLOB
        );
        "#,
    )
    .await
    .expect("Failed to set up source");

    for id in 1..=120i64 {
        db.exec_drop(
            "INSERT INTO `replicator_src` (id, sku, price, active, shipped, updated_at, payload) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                id,
                format!("SKU-{:04}", id),
                format!("{}.25", id),
                id % 2,
                "2024-02-29",
                "2024-02-29 23:59:58.123456",
                vec![0u8, 1, 2, (id % 256) as u8],
            ),
        )
        .await
        .expect("Failed to insert source row");
    }

    let config = ReplicationConfig {
        source: endpoint(&url, "replicator_src"),
        destination: endpoint(&url, "replicator_dst"),
        migration: options(50),
    };

    let report = commands::migrate(&config, CancellationToken::new())
        .await
        .expect("migration failed");
    assert!(report.table_created);
    assert_eq!(report.rows_transferred, 120);
    assert_eq!(report.batches, 3);
    assert!(report.is_verified());

    let row: Option<(String, String, String, Vec<u8>)> = db
        .query_first(
            "SELECT CAST(price AS CHAR), CAST(shipped AS CHAR), CAST(updated_at AS CHAR), payload \
             FROM `replicator_dst` WHERE id = 7",
        )
        .await
        .expect("row 7 query failed");
    let (price, shipped, updated_at, payload) = row.expect("row 7 missing");
    assert_eq!(price, "7.25");
    assert_eq!(shipped, "2024-02-29");
    assert_eq!(updated_at, "2024-02-29 23:59:58.123456");
    assert_eq!(payload, vec![0u8, 1, 2, 7]);

    db.query_drop(
        "INSERT INTO `replicator_src` (sku, price, active) \
         SELECT CONCAT('NEW-', id), 1, 0 FROM `replicator_src` WHERE id <= 30",
    )
    .await
    .expect("Failed to append source rows");

    let report = commands::sync(&config, CancellationToken::new())
        .await
        .expect("sync failed");
    assert_eq!(report.start_offset, 120);
    assert_eq!(report.rows_transferred, 30);
    assert!(report.is_verified());
    assert_eq!(count(&mut db, "replicator_dst").await, 150);

    println!("✓ Migrated 120 rows and synced 30 more on MySQL");

    let _ = db
        .query_drop("DROP TABLE IF EXISTS `replicator_src`; DROP TABLE IF EXISTS `replicator_dst`")
        .await;
    let _ = db.disconnect().await;
}

/// Test: a SQLite table is created and filled on MySQL
#[tokio::test]
#[ignore]
async fn test_sqlite_to_mysql_migration() {
    let url = get_test_url().expect("TEST_MYSQL_URL must be set");
    let mut db = conn(&url).await;
    db.query_drop("DROP TABLE IF EXISTS `replicator_notes`")
        .await
        .expect("Failed to reset target");

    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("notes.db");
    let sqlite = rusqlite::Connection::open(&path).expect("sqlite open");
    sqlite
        .execute_batch(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL, due DATE);
             INSERT INTO notes VALUES (1, 'write', '2024-06-01'), (2, 'test', NULL), (3, 'ship', '2024-07-15');",
        )
        .expect("sqlite setup");

    let config = ReplicationConfig {
        source: EndpointConfig::sqlite(path.to_string_lossy(), "notes"),
        destination: endpoint(&url, "replicator_notes"),
        migration: options(2),
    };
    let report = commands::migrate(&config, CancellationToken::new())
        .await
        .expect("migration failed");
    assert!(report.is_verified());
    assert_eq!(report.rows_transferred, 3);

    let due: Option<Option<String>> = db
        .query_first("SELECT CAST(due AS CHAR) FROM `replicator_notes` WHERE id = 3")
        .await
        .expect("row 3 query failed");
    assert_eq!(due.flatten().as_deref(), Some("2024-07-15"));

    let _ = db.query_drop("DROP TABLE IF EXISTS `replicator_notes`").await;
    let _ = db.disconnect().await;
}
