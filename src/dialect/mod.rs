// ABOUTME: SQL dialect strategy: one implementation per supported engine
// ABOUTME: Supplies connection strings, catalog SQL, pagination, DDL types, and insert SQL

mod mssql;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;

use std::fmt;

use anyhow::Result;

use crate::config::EndpointConfig;
use crate::error::ReplicatorError;
use crate::schema::{ColumnDescriptor, LogicalType};
use crate::table_ref::TableReference;
use crate::value::SqlValue;

pub use mssql::MssqlDialect;
pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Postgres,
    Mssql,
    Oracle,
    Sqlite,
}

impl Dialect {
    /// Resolve a configured `db_type`. Matching is case-insensitive.
    pub fn parse(db_type: &str) -> crate::error::Result<Self> {
        match db_type.trim().to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgresql" | "postgres" => Ok(Dialect::Postgres),
            "mssql" | "sqlserver" => Ok(Dialect::Mssql),
            "oracle" => Ok(Dialect::Oracle),
            "sqlite" => Ok(Dialect::Sqlite),
            _ => Err(ReplicatorError::configuration(format!(
                "unsupported db_type '{}' (expected one of: mysql, mariadb, postgresql, postgres, mssql, sqlserver, oracle, sqlite)",
                db_type
            ))),
        }
    }

    /// SQL strategy for this engine.
    pub fn sql(self) -> &'static dyn SqlDialect {
        match self {
            Dialect::MySql => &MySqlDialect,
            Dialect::Postgres => &PostgresDialect,
            Dialect::Mssql => &MssqlDialect,
            Dialect::Oracle => &OracleDialect,
            Dialect::Sqlite => &SqliteDialect,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dialect::MySql => "mysql",
            Dialect::Postgres => "postgresql",
            Dialect::Mssql => "mssql",
            Dialect::Oracle => "oracle",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// File-based engines take a path instead of host and credentials.
    pub fn is_file_based(self) -> bool {
        matches!(self, Dialect::Sqlite)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SQL text plus positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn plain(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// Driver-ready connection target.
///
/// `dsn` may embed credentials; `Display` prints the redacted form only.
#[derive(Clone)]
pub struct ConnectionString {
    pub dsn: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// SQL Server trusted authentication (no username or password configured).
    pub integrated_auth: bool,
    redacted: String,
}

impl ConnectionString {
    pub fn new(dsn: impl Into<String>, redacted: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            user: None,
            password: None,
            integrated_auth: false,
            redacted: redacted.into(),
        }
    }

    pub fn with_credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.user = user;
        self.password = password;
        self
    }

    pub fn redacted(&self) -> &str {
        &self.redacted
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted)
    }
}

impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("dsn", &self.redacted)
            .field("user", &self.user)
            .field("integrated_auth", &self.integrated_auth)
            .finish()
    }
}

/// Per-engine SQL generation.
///
/// Catalog queries return a normalized shape so the reflector can read any
/// engine's answer the same way:
///
/// - `exists_query`: one row, one integer column (> 0 when the table exists)
/// - `columns_query`: `name, native_type, char_length, precision, scale,
///   nullable (1/0), default, autoincrement (1/0)` in ordinal order
/// - `primary_key_query`: one column name per row, in key order
/// - `foreign_keys_query`: `column, referenced_table, referenced_column`
///
/// Unqualified references are resolved against the connection's current
/// schema, never by a global name search.
pub trait SqlDialect: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn default_port(&self) -> Option<u16>;

    fn connection_string(&self, endpoint: &EndpointConfig) -> Result<ConnectionString>;

    fn quote_ident(&self, name: &str) -> String;

    /// Name as stored in the catalog.
    fn to_catalog_name(&self, name: &str) -> String {
        name.to_string()
    }

    /// Catalog name as exposed to the rest of the crate.
    fn from_catalog_name(&self, name: &str) -> String {
        name.to_string()
    }

    /// Bind placeholder for the 1-based parameter `index`.
    fn placeholder(&self, index: usize) -> String;

    fn qualified_name(&self, table: &TableReference) -> String {
        match table.schema() {
            Some(schema) => format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(table.name())
            ),
            None => self.quote_ident(table.name()),
        }
    }

    fn ping_sql(&self) -> &'static str {
        "SELECT 1"
    }

    fn exists_query(&self, table: &TableReference) -> Statement;

    fn columns_query(&self, table: &TableReference) -> Statement;

    fn primary_key_query(&self, table: &TableReference) -> Statement;

    fn foreign_keys_query(&self, table: &TableReference) -> Statement;

    fn count_sql(&self, table: &TableReference) -> String {
        format!("SELECT COUNT(*) FROM {}", self.qualified_name(table))
    }

    fn truncate_sql(&self, table: &TableReference) -> String {
        format!("TRUNCATE TABLE {}", self.qualified_name(table))
    }

    /// Projection for one column in a page query.
    fn select_expr(&self, column: &ColumnDescriptor) -> String {
        self.quote_ident(&column.name)
    }

    /// One ordered page of rows.
    fn page_query(
        &self,
        table: &TableReference,
        columns: &[ColumnDescriptor],
        order_by: &str,
        offset: u64,
        limit: u64,
    ) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT {} OFFSET {}",
            select_list(self, columns),
            self.qualified_name(table),
            self.quote_ident(order_by),
            limit,
            offset
        )
    }

    /// Map a catalog type onto a logical type.
    fn logical_type(
        &self,
        native: &str,
        length: Option<i64>,
        precision: Option<i64>,
        scale: Option<i64>,
    ) -> LogicalType;

    /// DDL type for a logical type, or `None` when the engine has no
    /// rendering for it. `key` is set for primary-key columns, which some
    /// engines cannot declare with unbounded types.
    fn column_type(&self, ty: &LogicalType, key: bool) -> Option<String>;

    /// Identity column syntax, if the engine has one.
    fn identity_clause(&self, key: bool) -> Option<&'static str>;

    fn max_bind_params(&self) -> usize;

    fn max_rows_per_insert(&self) -> usize;

    /// Placeholder for a value bound into `column` by an insert.
    fn insert_placeholder(&self, index: usize, column: &ColumnDescriptor) -> String {
        let _ = column;
        self.placeholder(index)
    }

    /// Insert statements for one batch, split to respect bind limits.
    ///
    /// `identity` is set when one of `columns` is an identity column.
    fn insert_statements(
        &self,
        table: &TableReference,
        columns: &[ColumnDescriptor],
        rows: &[Vec<SqlValue>],
        identity: bool,
    ) -> Vec<Statement> {
        let _ = identity;
        let target = self.qualified_name(table);
        let column_list = column_list(self, columns);
        chunked_inserts(self, columns, rows, |tuples| {
            format!(
                "INSERT INTO {} ({}) VALUES {}",
                target,
                column_list,
                tuples.join(", ")
            )
        })
    }
}

/// `(schema or NULL, table)` parameters for catalog lookups.
pub(crate) fn catalog_params<D: SqlDialect + ?Sized>(
    sql: &D,
    table: &TableReference,
) -> Vec<SqlValue> {
    vec![
        table
            .schema()
            .map(|s| SqlValue::Text(sql.to_catalog_name(s)))
            .unwrap_or(SqlValue::Null),
        SqlValue::Text(sql.to_catalog_name(table.name())),
    ]
}

pub(crate) fn select_list<D: SqlDialect + ?Sized>(sql: &D, columns: &[ColumnDescriptor]) -> String {
    columns
        .iter()
        .map(|c| sql.select_expr(c))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn column_list<D: SqlDialect + ?Sized>(sql: &D, columns: &[ColumnDescriptor]) -> String {
    columns
        .iter()
        .map(|c| sql.quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Split rows into statements bounded by the dialect's parameter and row
/// limits. NULL cells are written as literals and bind nothing.
///
/// `assemble` turns the rendered `(…)` tuples of one chunk into SQL.
pub(crate) fn chunked_inserts<D, F>(
    sql: &D,
    columns: &[ColumnDescriptor],
    rows: &[Vec<SqlValue>],
    assemble: F,
) -> Vec<Statement>
where
    D: SqlDialect + ?Sized,
    F: Fn(&[String]) -> String,
{
    let max_params = sql.max_bind_params().max(1);
    let max_rows = sql.max_rows_per_insert().max(1);

    let mut statements = Vec::new();
    let mut tuples: Vec<String> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();

    for row in rows {
        let row_params = row.iter().filter(|v| !v.is_null()).count();
        if !tuples.is_empty()
            && (tuples.len() >= max_rows || params.len() + row_params > max_params)
        {
            statements.push(Statement::new(
                assemble(&tuples),
                std::mem::take(&mut params),
            ));
            tuples.clear();
        }

        let cells: Vec<String> = columns
            .iter()
            .zip(row)
            .map(|(column, value)| {
                if value.is_null() {
                    "NULL".to_string()
                } else {
                    params.push(value.clone());
                    sql.insert_placeholder(params.len(), column)
                }
            })
            .collect();
        tuples.push(format!("({})", cells.join(", ")));
    }

    if !tuples.is_empty() {
        statements.push(Statement::new(assemble(&tuples), params));
    }

    statements
}

/// Split `name(a,b)` into the lower-cased base name and its numeric arguments.
pub(crate) fn split_type_args(native: &str) -> (String, Vec<i64>) {
    let native = native.trim().to_ascii_lowercase();
    match native.find('(') {
        Some(open) => {
            let base = native[..open].trim().to_string();
            let close = native[open..].find(')').map(|i| open + i).unwrap_or(native.len());
            let args = native[open + 1..close]
                .split(',')
                .filter_map(|a| a.trim().parse().ok())
                .collect();
            let rest = native.get(close + 1..).unwrap_or("").trim();
            if rest.is_empty() {
                (base, args)
            } else {
                (format!("{} {}", base, rest), args)
            }
        }
        None => (native, Vec::new()),
    }
}

/// Positive lengths only; catalogs report `-1` or `0` for unbounded types.
pub(crate) fn bounded(value: Option<i64>) -> Option<u32> {
    value.filter(|v| *v > 0).and_then(|v| u32::try_from(v).ok())
}

pub(crate) fn quote_with(name: &str, open: char, close: char) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push(open);
    for ch in name.chars() {
        if ch == close {
            quoted.push(close);
        }
        quoted.push(ch);
    }
    quoted.push(close);
    quoted
}

pub(crate) fn require_host(endpoint: &EndpointConfig) -> Result<&str> {
    endpoint
        .host
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or_else(|| anyhow::anyhow!("host is required for {}", endpoint.db_type))
}
