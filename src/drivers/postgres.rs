// ABOUTME: PostgreSQL driver on tokio-postgres with native-tls
// ABOUTME: Encodes SqlValues by the server's parameter types and decodes rows by column type

use std::error::Error;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, Row};
use uuid::Uuid;

use super::{Driver, Rows};
use crate::dialect::Statement;
use crate::schema::LogicalType;
use crate::value::SqlValue;

pub struct PostgresDriver {
    dsn: String,
    accept_invalid_certs: bool,
}

impl PostgresDriver {
    pub fn new(dsn: String, accept_invalid_certs: bool) -> Self {
        Self {
            dsn,
            accept_invalid_certs,
        }
    }

    async fn connect(&self) -> Result<Client> {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .context("Failed to build TLS connector")?;
        let tls = MakeTlsConnector::new(connector);

        let (client, connection) = tokio_postgres::connect(&self.dsn, tls)
            .await
            .context("Failed to connect to PostgreSQL")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!("PostgreSQL connection closed with error: {}", e);
            }
        });

        Ok(client)
    }
}

fn params(statement: &Statement) -> Vec<&(dyn ToSql + Sync)> {
    statement
        .params
        .iter()
        .map(|p| p as &(dyn ToSql + Sync))
        .collect()
}

/// Logical type a value should be conformed to before encoding as `ty`.
fn logical_for(ty: &Type) -> Option<LogicalType> {
    let logical = match *ty {
        Type::BOOL => LogicalType::Boolean,
        Type::INT2 | Type::INT4 | Type::INT8 => LogicalType::BigInt,
        Type::FLOAT4 | Type::FLOAT8 => LogicalType::Double,
        Type::NUMERIC => LogicalType::Decimal {
            precision: None,
            scale: None,
        },
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => LogicalType::Text,
        Type::BYTEA => LogicalType::Binary,
        Type::DATE => LogicalType::Date,
        Type::TIME => LogicalType::Time,
        Type::TIMESTAMP => LogicalType::Timestamp,
        Type::TIMESTAMPTZ => LogicalType::TimestampTz,
        Type::UUID => LogicalType::Uuid,
        Type::JSON | Type::JSONB => LogicalType::Json,
        _ => return None,
    };
    Some(logical)
}

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }

        let value = match logical_for(ty) {
            Some(logical) => self.clone().conform(&logical),
            None => self.clone(),
        };

        match value {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql_checked(ty, out),
            SqlValue::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(v)?.to_sql_checked(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(v)?.to_sql_checked(ty, out)
                } else {
                    v.to_sql_checked(ty, out)
                }
            }
            SqlValue::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (v as f32).to_sql_checked(ty, out)
                } else {
                    v.to_sql_checked(ty, out)
                }
            }
            SqlValue::Decimal(v) => v.to_sql_checked(ty, out),
            SqlValue::Text(v) if *ty == Type::JSON || *ty == Type::JSONB => {
                serde_json::Value::String(v).to_sql_checked(ty, out)
            }
            SqlValue::Text(v) => v.to_sql_checked(ty, out),
            SqlValue::Bytes(v) => v.to_sql_checked(ty, out),
            SqlValue::Date(v) => v.to_sql_checked(ty, out),
            SqlValue::Time(v) => v.to_sql_checked(ty, out),
            SqlValue::Timestamp(v) => v.to_sql_checked(ty, out),
            SqlValue::TimestampTz(v) => v.to_sql_checked(ty, out),
            SqlValue::Uuid(v) => v.to_sql_checked(ty, out),
            SqlValue::Json(v) => v.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn decode_cell(row: &Row, idx: usize) -> Result<SqlValue> {
    let column = &row.columns()[idx];
    let value = match column.type_().name() {
        "bool" => row.try_get::<_, Option<bool>>(idx)?.map(SqlValue::Bool),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| SqlValue::Int(v.into())),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| SqlValue::Int(v.into())),
        "int8" => row.try_get::<_, Option<i64>>(idx)?.map(SqlValue::Int),
        "oid" => row
            .try_get::<_, Option<u32>>(idx)?
            .map(|v| SqlValue::Int(v.into())),
        "char" => row
            .try_get::<_, Option<i8>>(idx)?
            .map(|v| SqlValue::Int(v.into())),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| SqlValue::Float(v.into())),
        "float8" => row.try_get::<_, Option<f64>>(idx)?.map(SqlValue::Float),
        "numeric" => row
            .try_get::<_, Option<Decimal>>(idx)?
            .map(SqlValue::Decimal),
        "bytea" => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(SqlValue::Bytes),
        "date" => row.try_get::<_, Option<NaiveDate>>(idx)?.map(SqlValue::Date),
        "time" => row.try_get::<_, Option<NaiveTime>>(idx)?.map(SqlValue::Time),
        "timestamp" => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(SqlValue::Timestamp),
        "timestamptz" => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(SqlValue::TimestampTz),
        "uuid" => row.try_get::<_, Option<Uuid>>(idx)?.map(SqlValue::Uuid),
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(SqlValue::Json),
        _ => row.try_get::<_, Option<String>>(idx)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

fn decode_rows(rows: Vec<Row>) -> Result<Rows> {
    rows.iter()
        .map(|row| {
            (0..row.len())
                .map(|idx| {
                    decode_cell(row, idx).with_context(|| {
                        format!("Failed to decode column '{}'", row.columns()[idx].name())
                    })
                })
                .collect()
        })
        .collect()
}

#[async_trait]
impl Driver for PostgresDriver {
    async fn query(&self, statement: &Statement) -> Result<Rows> {
        let client = self.connect().await?;
        let rows = client
            .query(statement.sql.as_str(), &params(statement))
            .await
            .with_context(|| format!("Query failed: {}", statement.sql))?;
        decode_rows(rows)
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let client = self.connect().await?;
        client
            .execute(statement.sql.as_str(), &params(statement))
            .await
            .with_context(|| format!("Statement failed: {}", statement.sql))
    }

    async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64> {
        let mut client = self.connect().await?;
        let tx = client
            .transaction()
            .await
            .context("Failed to begin transaction")?;

        let mut affected = 0u64;
        for statement in statements {
            affected += tx
                .execute(statement.sql.as_str(), &params(statement))
                .await
                .with_context(|| format!("Statement failed: {}", truncate_sql(&statement.sql)))?;
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(affected)
    }
}

/// Batch inserts can be huge; keep error messages readable.
fn truncate_sql(sql: &str) -> &str {
    match sql.char_indices().nth(200) {
        Some((idx, _)) => &sql[..idx],
        None => sql,
    }
}
