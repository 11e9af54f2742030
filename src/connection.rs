// ABOUTME: Connection provider: turns an endpoint config into a live, verified handle
// ABOUTME: Handles carry no session; each operation opens and releases its own

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::config::EndpointConfig;
use crate::dialect::{Dialect, SqlDialect, Statement};
use crate::drivers::{driver_for, Driver, Rows};
use crate::error::ReplicatorError;
use crate::utils::retry_with_backoff;

const PING_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// A verified connection target for one endpoint.
pub struct ConnectionHandle {
    dialect: Dialect,
    label: String,
    driver: Box<dyn Driver>,
    closed: AtomicBool,
}

impl ConnectionHandle {
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn sql(&self) -> &'static dyn SqlDialect {
        self.dialect.sql()
    }

    /// Connection target with the password redacted.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Mark the handle closed. Safe to call more than once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Closed connection to {}", self.label);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            bail!("connection to {} is closed", self.label);
        }
        Ok(())
    }

    pub async fn query(&self, statement: &Statement) -> Result<Rows> {
        self.ensure_open()?;
        tracing::trace!("[{}] {}", self.dialect, statement.sql);
        self.driver.query(statement).await
    }

    pub async fn execute(&self, statement: &Statement) -> Result<u64> {
        self.ensure_open()?;
        tracing::trace!("[{}] {}", self.dialect, statement.sql);
        self.driver.execute(statement).await
    }

    /// Run statements in one destination transaction.
    pub async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64> {
        self.ensure_open()?;
        tracing::trace!(
            "[{}] {} statement(s) in one transaction",
            self.dialect,
            statements.len()
        );
        self.driver.execute_atomic(statements).await
    }

    async fn ping(&self) -> Result<()> {
        let rows = self
            .query(&Statement::plain(self.sql().ping_sql()))
            .await
            .context("liveness query failed")?;
        if rows.is_empty() {
            bail!("liveness query returned no rows");
        }
        Ok(())
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Builds connection handles from endpoint configuration.
pub struct ConnectionProvider;

impl ConnectionProvider {
    /// Resolve the dialect, assemble the connection string, and verify the
    /// endpoint answers a trivial query.
    ///
    /// The liveness check is retried `connect_retries` times with exponential
    /// backoff before failing with a connection error.
    pub async fn open(endpoint: &EndpointConfig) -> crate::error::Result<ConnectionHandle> {
        let dialect = endpoint.dialect()?;
        let connection = dialect
            .sql()
            .connection_string(endpoint)
            .map_err(|e| ReplicatorError::configuration(format!("{:#}", e)))?;

        let handle = ConnectionHandle {
            dialect,
            label: connection.redacted().to_string(),
            driver: driver_for(dialect, &connection, endpoint),
            closed: AtomicBool::new(false),
        };

        tracing::info!("Connecting to {}", handle.label);
        retry_with_backoff(|| handle.ping(), endpoint.connect_retries, PING_INITIAL_DELAY)
            .await
            .map_err(|e| ReplicatorError::connection(handle.label.clone(), e))?;
        tracing::info!("✓ Connected to {}", handle.label);

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sqlite_endpoint(dir: &TempDir) -> EndpointConfig {
        EndpointConfig::sqlite(
            dir.path().join("conn.db").to_string_lossy().into_owned(),
            "items",
        )
    }

    #[tokio::test]
    async fn test_open_sqlite_and_query() {
        let dir = TempDir::new().unwrap();
        let handle = ConnectionProvider::open(&sqlite_endpoint(&dir)).await.unwrap();
        assert_eq!(handle.dialect(), Dialect::Sqlite);
        assert!(handle.label().starts_with("sqlite://"));

        let rows = handle.query(&Statement::plain("SELECT 1")).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let dir = TempDir::new().unwrap();
        let handle = ConnectionProvider::open(&sqlite_endpoint(&dir)).await.unwrap();
        handle.close();
        handle.close();
        assert!(handle.is_closed());

        let err = handle
            .query(&Statement::plain("SELECT 1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn test_unsupported_db_type_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let mut endpoint = sqlite_endpoint(&dir);
        endpoint.db_type = "informix".to_string();

        let err = ConnectionProvider::open(&endpoint).await.err().unwrap();
        assert!(matches!(err, ReplicatorError::Configuration(ref m) if m.contains("informix")));
    }

    #[tokio::test]
    async fn test_unreachable_database_is_connection_error() {
        let dir = TempDir::new().unwrap();
        let mut endpoint = sqlite_endpoint(&dir);
        endpoint.database = dir
            .path()
            .join("missing")
            .join("nested.db")
            .to_string_lossy()
            .into_owned();

        let err = ConnectionProvider::open(&endpoint).await.err().unwrap();
        assert!(matches!(err, ReplicatorError::Connection { .. }));
    }
}
