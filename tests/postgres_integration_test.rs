// ABOUTME: Integration tests against live PostgreSQL servers
// ABOUTME: Run with TEST_SOURCE_URL and TEST_TARGET_URL set and `--ignored`

use std::env;

use table_replicator::commands;
use table_replicator::config::{EndpointConfig, MigrationOptions, ReplicationConfig};
use tempfile::TempDir;
use tokio_postgres::NoTls;
use tokio_util::sync::CancellationToken;

/// Helper to get test database URLs from environment
fn get_test_urls() -> Option<(String, String)> {
    let source = env::var("TEST_SOURCE_URL").ok()?;
    let target = env::var("TEST_TARGET_URL").ok()?;
    Some((source, target))
}

/// Build an endpoint from a postgres:// URL
fn endpoint(raw: &str, table: &str) -> EndpointConfig {
    let url = url::Url::parse(raw).expect("invalid test URL");
    EndpointConfig {
        db_type: "postgresql".to_string(),
        host: url.host_str().map(str::to_string),
        port: url.port(),
        database: url.path().trim_start_matches('/').to_string(),
        username: Some(url.username().to_string()).filter(|u| !u.is_empty()),
        password: url.password().map(str::to_string),
        table: table.to_string(),
        connect_retries: 0,
        encrypt: false,
        trust_server_certificate: true,
    }
}

async fn client(url: &str) -> tokio_postgres::Client {
    let (client, connection) = tokio_postgres::connect(url, NoTls)
        .await
        .expect("Failed to connect");
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

async fn count(client: &tokio_postgres::Client, table: &str) -> i64 {
    client
        .query_one(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .await
        .expect("count failed")
        .get(0)
}

fn options(batch_size: u64) -> MigrationOptions {
    MigrationOptions {
        batch_size,
        show_progress: false,
        ..MigrationOptions::default()
    }
}

/// Test: typed rows survive a PostgreSQL to PostgreSQL migration and sync
#[tokio::test]
#[ignore]
async fn test_postgres_migrate_then_sync() {
    let (source_url, target_url) =
        get_test_urls().expect("TEST_SOURCE_URL and TEST_TARGET_URL must be set");
    let source = client(&source_url).await;
    let target = client(&target_url).await;

    source
        .batch_execute(
            r#"
            DROP TABLE IF EXISTS "public"."replicator_orders";
            CREATE TABLE "public"."replicator_orders" (
                id BIGINT PRIMARY KEY,
                ref UUID NOT NULL,
                total NUMERIC(12,2) DEFAULT 0,
                paid BOOLEAN,
                placed_at TIMESTAMPTZ,
                details JSONB
            );
            INSERT INTO "public"."replicator_orders"
            SELECT g, gen_random_uuid(), g * 1.25, g % 2 = 0, now(), jsonb_build_object('n', g)
            FROM generate_series(1, 250) g;
            "#,
        )
        .await
        .expect("Failed to set up source");
    target
        .batch_execute(r#"DROP TABLE IF EXISTS "public"."replicator_orders" CASCADE"#)
        .await
        .expect("Failed to reset target");

    let config = ReplicationConfig {
        source: endpoint(&source_url, "public.replicator_orders"),
        destination: endpoint(&target_url, "public.replicator_orders"),
        migration: options(100),
    };

    let report = commands::migrate(&config, CancellationToken::new())
        .await
        .expect("migration failed");
    assert!(report.table_created);
    assert_eq!(report.rows_transferred, 250);
    assert_eq!(report.batches, 3);
    assert!(report.is_verified());

    let row = target
        .query_one(
            r#"SELECT total::text, paid, details->>'n' FROM "public"."replicator_orders" WHERE id = 4"#,
            &[],
        )
        .await
        .expect("row 4 missing");
    assert_eq!(row.get::<_, String>(0), "5.00");
    assert!(row.get::<_, bool>(1));
    assert_eq!(row.get::<_, String>(2), "4");

    source
        .batch_execute(
            r#"INSERT INTO "public"."replicator_orders"
               SELECT g, gen_random_uuid(), g, false, now(), NULL
               FROM generate_series(251, 300) g"#,
        )
        .await
        .expect("Failed to append source rows");

    let report = commands::sync(&config, CancellationToken::new())
        .await
        .expect("sync failed");
    assert_eq!(report.start_offset, 250);
    assert_eq!(report.rows_transferred, 50);
    assert!(report.is_verified());
    assert_eq!(count(&target, r#""public"."replicator_orders""#).await, 300);

    println!("✓ Migrated 250 rows and synced 50 more");

    let _ = source
        .batch_execute(r#"DROP TABLE IF EXISTS "public"."replicator_orders" CASCADE"#)
        .await;
    let _ = target
        .batch_execute(r#"DROP TABLE IF EXISTS "public"."replicator_orders" CASCADE"#)
        .await;
}

/// Test: a SQLite table is created and filled on PostgreSQL
#[tokio::test]
#[ignore]
async fn test_sqlite_to_postgres_migration() {
    let (_source_url, target_url) =
        get_test_urls().expect("TEST_SOURCE_URL and TEST_TARGET_URL must be set");
    let target = client(&target_url).await;
    target
        .batch_execute(r#"DROP TABLE IF EXISTS "public"."replicator_notes" CASCADE"#)
        .await
        .expect("Failed to reset target");

    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("notes.db");
    let sqlite = rusqlite::Connection::open(&path).expect("sqlite open");
    sqlite
        .execute_batch(
            "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL, done BOOLEAN, due DATE);
             INSERT INTO notes VALUES (1, 'write', 1, '2024-06-01'), (2, 'test', 0, NULL), (3, 'ship', 0, '2024-07-15');",
        )
        .expect("sqlite setup");

    let config = ReplicationConfig {
        source: EndpointConfig::sqlite(path.to_string_lossy(), "notes"),
        destination: endpoint(&target_url, "public.replicator_notes"),
        migration: options(2),
    };
    let report = commands::migrate(&config, CancellationToken::new())
        .await
        .expect("migration failed");
    assert!(report.is_verified());
    assert_eq!(report.rows_transferred, 3);

    let row = target
        .query_one(
            r#"SELECT done, due::text FROM "public"."replicator_notes" WHERE id = 1"#,
            &[],
        )
        .await
        .expect("row 1 missing");
    assert!(row.get::<_, bool>(0));
    assert_eq!(row.get::<_, String>(1), "2024-06-01");

    let _ = target
        .batch_execute(r#"DROP TABLE IF EXISTS "public"."replicator_notes" CASCADE"#)
        .await;
}
