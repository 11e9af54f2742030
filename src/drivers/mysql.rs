// ABOUTME: MySQL/MariaDB driver on mysql_async using the binary protocol
// ABOUTME: Maps mysql_async Values to SqlValues using column type and character set

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::consts::ColumnType;
use mysql_async::prelude::*;
use mysql_async::{Column, Conn, Opts, Params, Row, TxOpts, Value};
use rust_decimal::Decimal;

use super::{Driver, Rows};
use crate::dialect::Statement;
use crate::value::SqlValue;

/// Character set id MySQL reports for binary strings.
const BINARY_CHARSET: u16 = 63;

pub struct MySqlDriver {
    dsn: String,
}

impl MySqlDriver {
    pub fn new(dsn: String) -> Self {
        Self { dsn }
    }

    async fn connect(&self) -> Result<Conn> {
        let opts = Opts::from_url(&self.dsn).context("Invalid MySQL connection URL")?;
        Conn::new(opts)
            .await
            .context("Failed to connect to MySQL")
    }
}

fn params(statement: &Statement) -> Result<Params> {
    if statement.params.is_empty() {
        return Ok(Params::Empty);
    }
    let values = statement
        .params
        .iter()
        .map(bind_value)
        .collect::<Result<Vec<_>>>()?;
    Ok(Params::Positional(values))
}

fn date_value(date: NaiveDate, time: NaiveTime) -> Result<Value> {
    // MySQL's binary protocol has no representation for years before 0
    let year = u16::try_from(date.year())
        .with_context(|| format!("MySQL cannot store year {} of {}", date.year(), date))?;
    Ok(Value::Date(
        year,
        date.month() as u8,
        date.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
        time.nanosecond() / 1_000,
    ))
}

fn bind_value(value: &SqlValue) -> Result<Value> {
    let bound = match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(v) => Value::Int(i64::from(*v)),
        SqlValue::Int(v) => Value::Int(*v),
        SqlValue::Float(v) => Value::Double(*v),
        SqlValue::Bytes(v) => Value::Bytes(v.clone()),
        SqlValue::Date(d) => date_value(*d, NaiveTime::default())?,
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
        SqlValue::Timestamp(ts) => date_value(ts.date(), ts.time())?,
        SqlValue::TimestampTz(ts) => {
            let naive = ts.naive_utc();
            date_value(naive.date(), naive.time())?
        }
        other => other
            .render_text()
            .map(|s| Value::Bytes(s.into_bytes()))
            .unwrap_or(Value::NULL),
    };
    Ok(bound)
}

fn decode_bytes(column: &Column, bytes: Vec<u8>) -> SqlValue {
    match column.column_type() {
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            let text = String::from_utf8_lossy(&bytes);
            Decimal::from_str(text.trim())
                .map(SqlValue::Decimal)
                .unwrap_or_else(|_| SqlValue::Text(text.into_owned()))
        }
        ColumnType::MYSQL_TYPE_JSON => match serde_json::from_slice(&bytes) {
            Ok(json) => SqlValue::Json(json),
            Err(_) => SqlValue::Bytes(bytes),
        },
        ColumnType::MYSQL_TYPE_BIT => {
            let value = bytes.iter().fold(0i64, |acc, b| (acc << 8) | i64::from(*b));
            SqlValue::Int(value)
        }
        _ if column.character_set() == BINARY_CHARSET => SqlValue::Bytes(bytes),
        _ => match String::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
    }
}

fn decode_value(column: &Column, value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(v) => SqlValue::Int(v),
        Value::UInt(v) => i64::try_from(v)
            .map(SqlValue::Int)
            .unwrap_or_else(|_| SqlValue::Decimal(Decimal::from(v))),
        Value::Float(v) => SqlValue::Float(f64::from(v)),
        Value::Double(v) => SqlValue::Float(v),
        Value::Bytes(bytes) => decode_bytes(column, bytes),
        Value::Date(y, m, d, h, mi, s, us) => {
            let date = NaiveDate::from_ymd_opt(i32::from(y), u32::from(m), u32::from(d));
            let time = NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(mi), u32::from(s), us);
            match (date, time, column.column_type()) {
                (Some(date), _, ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE) => {
                    SqlValue::Date(date)
                }
                (Some(date), Some(time), _) => SqlValue::Timestamp(date.and_time(time)),
                // zero dates ('0000-00-00') have no calendar equivalent
                _ => SqlValue::Null,
            }
        }
        Value::Time(negative, days, h, m, s, us) => {
            match NaiveTime::from_hms_micro_opt(u32::from(h), u32::from(m), u32::from(s), us) {
                Some(time) if !negative && days == 0 => SqlValue::Time(time),
                _ => SqlValue::Text(format!(
                    "{}{}:{:02}:{:02}.{:06}",
                    if negative { "-" } else { "" },
                    days * 24 + u32::from(h),
                    m,
                    s,
                    us
                )),
            }
        }
    }
}

fn decode_row(mut row: Row) -> Vec<SqlValue> {
    let columns = row.columns();
    (0..columns.len())
        .map(|i| {
            let value = row.take::<Value, usize>(i).unwrap_or(Value::NULL);
            decode_value(&columns[i], value)
        })
        .collect()
}

#[async_trait]
impl Driver for MySqlDriver {
    async fn query(&self, statement: &Statement) -> Result<Rows> {
        let params = params(statement)?;
        let mut conn = self.connect().await?;
        let result: Result<Vec<Row>> = conn
            .exec(statement.sql.as_str(), params)
            .await
            .with_context(|| format!("Query failed: {}", statement.sql));
        let _ = conn.disconnect().await;
        Ok(result?.into_iter().map(decode_row).collect())
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let params = params(statement)?;
        let mut conn = self.connect().await?;
        let result = conn
            .exec_drop(statement.sql.as_str(), params)
            .await
            .with_context(|| format!("Statement failed: {}", statement.sql));
        let affected = conn.affected_rows();
        let _ = conn.disconnect().await;
        result.map(|_| affected)
    }

    async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64> {
        let mut conn = self.connect().await?;
        let result = run_transaction(&mut conn, statements).await;
        let _ = conn.disconnect().await;
        result
    }
}

async fn run_transaction(conn: &mut Conn, statements: &[Statement]) -> Result<u64> {
    let mut tx = conn
        .start_transaction(TxOpts::default())
        .await
        .context("Failed to begin transaction")?;

    let mut affected = 0u64;
    for statement in statements {
        tx.exec_drop(statement.sql.as_str(), params(statement)?)
            .await
            .context("Batch statement failed")?;
        affected += tx.affected_rows();
    }

    // dropping an uncommitted transaction rolls it back
    tx.commit().await.context("Failed to commit transaction")?;
    Ok(affected)
}
