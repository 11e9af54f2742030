// ABOUTME: SQLite driver on rusqlite, run on the tokio blocking pool
// ABOUTME: Opens the database file per call and maps storage classes to SqlValues

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};

use super::{Driver, Rows};
use crate::dialect::Statement;
use crate::value::SqlValue;

pub struct SqliteDriver {
    path: String,
}

impl SqliteDriver {
    pub fn new(path: String) -> Self {
        Self { path }
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)
                .with_context(|| format!("Failed to open SQLite database '{}'", path))?;
            f(&mut conn)
        })
        .await
        .context("SQLite task panicked")?
    }
}

fn bind_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(v) => Value::Integer(i64::from(*v)),
        SqlValue::Int(v) => Value::Integer(*v),
        SqlValue::Float(v) => Value::Real(*v),
        SqlValue::Bytes(v) => Value::Blob(v.clone()),
        other => other
            .render_text()
            .map(Value::Text)
            .unwrap_or(Value::Null),
    }
}

fn decode_value(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Int(v),
        ValueRef::Real(v) => SqlValue::Float(v),
        ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => SqlValue::Bytes(v.to_vec()),
    }
}

fn run_query(conn: &Connection, statement: &Statement) -> Result<Rows> {
    let mut stmt = conn
        .prepare(&statement.sql)
        .with_context(|| format!("Failed to prepare: {}", statement.sql))?;
    let width = stmt.column_count();
    let params = params_from_iter(statement.params.iter().map(bind_value));

    let mut rows = stmt.query(params).context("Failed to run query")?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().context("Failed to read row")? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(decode_value(row.get_ref(i)?));
        }
        out.push(cells);
    }
    Ok(out)
}

fn run_statement(conn: &Connection, statement: &Statement) -> Result<u64> {
    let params = params_from_iter(statement.params.iter().map(bind_value));
    let affected = conn
        .execute(&statement.sql, params)
        .with_context(|| format!("Failed to execute: {}", statement.sql))?;
    Ok(affected as u64)
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn query(&self, statement: &Statement) -> Result<Rows> {
        let statement = statement.clone();
        self.with_connection(move |conn| run_query(conn, &statement))
            .await
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let statement = statement.clone();
        self.with_connection(move |conn| run_statement(conn, &statement))
            .await
    }

    async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64> {
        let statements = statements.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction().context("Failed to begin transaction")?;
            let mut affected = 0u64;
            for statement in &statements {
                affected += run_statement(&tx, statement)?;
            }
            tx.commit().context("Failed to commit transaction")?;
            Ok(affected)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn driver(dir: &TempDir) -> SqliteDriver {
        SqliteDriver::new(dir.path().join("test.db").to_string_lossy().into_owned())
    }

    #[tokio::test]
    async fn test_query_decodes_storage_classes() {
        let dir = TempDir::new().unwrap();
        let db = driver(&dir);
        db.execute(&Statement::plain(
            "CREATE TABLE t (i INTEGER, r REAL, s TEXT, b BLOB, n TEXT)",
        ))
        .await
        .unwrap();
        db.execute(&Statement::new(
            "INSERT INTO t VALUES (?, ?, ?, ?, NULL)",
            vec![
                SqlValue::Int(7),
                SqlValue::Float(1.5),
                SqlValue::Text("x".to_string()),
                SqlValue::Bytes(vec![1, 2]),
            ],
        ))
        .await
        .unwrap();

        let rows = db.query(&Statement::plain("SELECT * FROM t")).await.unwrap();
        assert_eq!(
            rows,
            vec![vec![
                SqlValue::Int(7),
                SqlValue::Float(1.5),
                SqlValue::Text("x".to_string()),
                SqlValue::Bytes(vec![1, 2]),
                SqlValue::Null,
            ]]
        );
    }

    #[tokio::test]
    async fn test_execute_atomic_rolls_back_on_failure() {
        let dir = TempDir::new().unwrap();
        let db = driver(&dir);
        db.execute(&Statement::plain("CREATE TABLE t (id INTEGER PRIMARY KEY)"))
            .await
            .unwrap();

        let result = db
            .execute_atomic(&[
                Statement::plain("INSERT INTO t VALUES (1)"),
                Statement::plain("INSERT INTO t VALUES (1)"),
            ])
            .await;
        assert!(result.is_err());

        let rows = db
            .query(&Statement::plain("SELECT COUNT(*) FROM t"))
            .await
            .unwrap();
        assert_eq!(rows[0][0], SqlValue::Int(0));
    }

    #[test]
    fn test_bind_renders_typed_values_as_text() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(
            bind_value(&SqlValue::Date(date)),
            Value::Text("2024-02-29".to_string())
        );
        assert_eq!(bind_value(&SqlValue::Bool(true)), Value::Integer(1));
    }
}
