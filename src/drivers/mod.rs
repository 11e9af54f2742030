// ABOUTME: Database driver seam: execute SQL and get rows as SqlValues
// ABOUTME: One implementation per engine; every call opens and releases its own session

mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::EndpointConfig;
use crate::dialect::{ConnectionString, Dialect, Statement};
use crate::value::SqlValue;

pub use mssql::MssqlDriver;
pub use mysql::MySqlDriver;
pub use oracle::OracleDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

/// Rows returned by a query, one `Vec` of cells per row.
pub type Rows = Vec<Vec<SqlValue>>;

/// Minimal execution surface the replication core needs from an engine.
///
/// No session outlives a call: each method connects, runs, and disconnects,
/// on success and on failure alike.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Run a query and decode every row.
    async fn query(&self, statement: &Statement) -> Result<Rows>;

    /// Run one statement in its own transaction and return affected rows.
    async fn execute(&self, statement: &Statement) -> Result<u64>;

    /// Run all statements in a single transaction. Nothing is committed if
    /// any statement fails.
    async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64>;
}

/// Build the driver for `dialect` from a prepared connection string.
pub fn driver_for(
    dialect: Dialect,
    connection: &ConnectionString,
    endpoint: &EndpointConfig,
) -> Box<dyn Driver> {
    match dialect {
        Dialect::Postgres => Box::new(PostgresDriver::new(
            connection.dsn.clone(),
            !endpoint.encrypt || endpoint.trust_server_certificate,
        )),
        Dialect::MySql => Box::new(MySqlDriver::new(connection.dsn.clone())),
        Dialect::Mssql => Box::new(MssqlDriver::new(
            connection.dsn.clone(),
            connection.integrated_auth,
        )),
        Dialect::Oracle => Box::new(OracleDriver::new(
            connection.dsn.clone(),
            connection.user.clone().unwrap_or_default(),
            connection.password.clone().unwrap_or_default(),
        )),
        Dialect::Sqlite => Box::new(SqliteDriver::new(connection.dsn.clone())),
    }
}
