// ABOUTME: Oracle driver on the oracle crate (ODPI-C), run on the tokio blocking pool
// ABOUTME: Decodes cells by OracleType and commits or rolls back explicitly

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use oracle::sql_type::{OracleType, ToSql};
use oracle::{Connection, Row};
use rust_decimal::Decimal;

use super::{Driver, Rows};
use crate::dialect::Statement;
use crate::value::SqlValue;

pub struct OracleDriver {
    dsn: String,
    user: String,
    password: String,
}

impl OracleDriver {
    pub fn new(dsn: String, user: String, password: String) -> Self {
        Self {
            dsn,
            user,
            password,
        }
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let (dsn, user, password) = (self.dsn.clone(), self.user.clone(), self.password.clone());
        tokio::task::spawn_blocking(move || {
            let conn = Connection::connect(&user, &password, &dsn)
                .with_context(|| format!("Failed to connect to Oracle at {}", dsn))?;
            let result = f(&conn);
            let _ = conn.close();
            result
        })
        .await
        .context("Oracle task panicked")?
    }
}

fn bind_value(value: &SqlValue) -> Box<dyn ToSql> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(v) => Box::new(i64::from(*v)),
        SqlValue::Int(v) => Box::new(*v),
        SqlValue::Float(v) => Box::new(*v),
        SqlValue::Bytes(v) => Box::new(v.clone()),
        SqlValue::Timestamp(v) => Box::new(*v),
        SqlValue::TimestampTz(v) => Box::new(*v),
        SqlValue::Date(v) => match v.and_hms_opt(0, 0, 0) {
            Some(midnight) => Box::new(midnight),
            None => Box::new(Option::<String>::None),
        },
        other => Box::new(other.render_text()),
    }
}

/// Unconstrained NUMBER comes back as text; keep integers integral.
fn number_value(text: String) -> SqlValue {
    if let Ok(v) = text.parse::<i64>() {
        return SqlValue::Int(v);
    }
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map(SqlValue::Decimal)
        .unwrap_or(SqlValue::Text(text))
}

fn decode_cell(row: &Row, idx: usize, ty: &OracleType) -> Result<SqlValue> {
    let value = match ty {
        OracleType::Int64 => row.get::<_, Option<i64>>(idx)?.map(SqlValue::Int),
        OracleType::Number(_, _) | OracleType::Float(_) => {
            row.get::<_, Option<String>>(idx)?.map(number_value)
        }
        OracleType::BinaryFloat | OracleType::BinaryDouble => {
            row.get::<_, Option<f64>>(idx)?.map(SqlValue::Float)
        }
        OracleType::Boolean => row.get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        OracleType::Date | OracleType::Timestamp(_) => row
            .get::<_, Option<NaiveDateTime>>(idx)?
            .map(SqlValue::Timestamp),
        OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => row
            .get::<_, Option<DateTime<Utc>>>(idx)?
            .map(SqlValue::TimestampTz),
        OracleType::Raw(_) | OracleType::LongRaw | OracleType::BLOB => {
            row.get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Bytes)
        }
        _ => row.get::<_, Option<String>>(idx)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

fn run_query(conn: &Connection, statement: &Statement) -> Result<Rows> {
    let values: Vec<Box<dyn ToSql>> = statement.params.iter().map(bind_value).collect();
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();

    let rows = conn
        .query(&statement.sql, &params)
        .with_context(|| format!("Query failed: {}", statement.sql))?;
    let types: Vec<OracleType> = rows
        .column_info()
        .iter()
        .map(|c| c.oracle_type().clone())
        .collect();

    let mut out = Vec::new();
    for row in rows {
        let row = row.context("Failed to fetch row")?;
        let cells = types
            .iter()
            .enumerate()
            .map(|(idx, ty)| decode_cell(&row, idx, ty))
            .collect::<Result<Vec<_>>>()?;
        out.push(cells);
    }
    Ok(out)
}

fn run_statement(conn: &Connection, statement: &Statement) -> Result<u64> {
    let values: Vec<Box<dyn ToSql>> = statement.params.iter().map(bind_value).collect();
    let params: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();

    let stmt = conn
        .execute(&statement.sql, &params)
        .with_context(|| format!("Statement failed: {}", statement.sql))?;
    Ok(stmt.row_count()?)
}

fn run_transaction(conn: &Connection, statements: &[Statement]) -> Result<u64> {
    let mut affected = 0u64;
    for statement in statements {
        match run_statement(conn, statement) {
            Ok(n) => affected += n,
            Err(e) => {
                let _ = conn.rollback();
                return Err(e);
            }
        }
    }
    conn.commit().context("Failed to commit transaction")?;
    Ok(affected)
}

#[async_trait]
impl Driver for OracleDriver {
    async fn query(&self, statement: &Statement) -> Result<Rows> {
        let statement = statement.clone();
        self.with_connection(move |conn| run_query(conn, &statement))
            .await
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let statement = statement.clone();
        self.with_connection(move |conn| run_transaction(conn, std::slice::from_ref(&statement)))
            .await
    }

    async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64> {
        let statements = statements.to_vec();
        self.with_connection(move |conn| run_transaction(conn, &statements))
            .await
    }
}
