// ABOUTME: SQL Server driver on tiberius over a tokio TcpStream
// ABOUTME: Binds SqlValues as TDS parameters and wraps batches in explicit transactions

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use tiberius::numeric::Numeric;
use tiberius::{Client, ColumnData, Config, FromSql, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use uuid::Uuid;

use super::{Driver, Rows};
use crate::dialect::Statement;
use crate::value::SqlValue;

type MssqlClient = Client<Compat<TcpStream>>;

pub struct MssqlDriver {
    ado: String,
    integrated_auth: bool,
}

impl MssqlDriver {
    pub fn new(ado: String, integrated_auth: bool) -> Self {
        Self {
            ado,
            integrated_auth,
        }
    }

    async fn connect(&self) -> Result<MssqlClient> {
        #[allow(unused_mut)]
        let mut config =
            Config::from_ado_string(&self.ado).context("Invalid SQL Server connection string")?;

        if self.integrated_auth {
            #[cfg(any(windows, feature = "mssql-integrated-auth"))]
            config.authentication(tiberius::AuthMethod::Integrated);
            #[cfg(not(any(windows, feature = "mssql-integrated-auth")))]
            bail!(
                "trusted authentication requires Windows or the mssql-integrated-auth feature; \
                 configure a username and password instead"
            );
        }

        let tcp = TcpStream::connect(config.get_addr())
            .await
            .with_context(|| format!("Failed to reach {}", config.get_addr()))?;
        tcp.set_nodelay(true)?;

        Client::connect(config, tcp.compat_write())
            .await
            .context("Failed to connect to SQL Server")
    }
}

fn bind<'a>(query: &mut Query<'a>, value: &SqlValue) {
    match value {
        SqlValue::Null => query.bind(Option::<String>::None),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Decimal(v) => match u8::try_from(v.scale()) {
            Ok(scale) => query.bind(Numeric::new_with_scale(v.mantissa(), scale)),
            Err(_) => query.bind(v.to_string()),
        },
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
        SqlValue::Timestamp(v) => query.bind(*v),
        SqlValue::TimestampTz(v) => query.bind(*v),
        // implicit conversion from nvarchar on the server side
        SqlValue::Uuid(v) => query.bind(v.to_string()),
        SqlValue::Json(v) => query.bind(v.to_string()),
    }
}

fn build_query(statement: &Statement) -> Query<'_> {
    let mut query = Query::new(statement.sql.as_str());
    for value in &statement.params {
        bind(&mut query, value);
    }
    query
}

fn numeric_value(n: Numeric) -> SqlValue {
    Decimal::try_from_i128_with_scale(n.value(), u32::from(n.scale()))
        .map(SqlValue::Decimal)
        .unwrap_or_else(|_| SqlValue::Text(n.to_string()))
}

fn decode_cell(data: ColumnData<'static>) -> Result<SqlValue> {
    let value = match &data {
        ColumnData::U8(v) => v.map(|v| SqlValue::Int(v.into())),
        ColumnData::I16(v) => v.map(|v| SqlValue::Int(v.into())),
        ColumnData::I32(v) => v.map(|v| SqlValue::Int(v.into())),
        ColumnData::I64(v) => v.map(SqlValue::Int),
        ColumnData::F32(v) => v.map(|v| SqlValue::Float(v.into())),
        ColumnData::F64(v) => v.map(SqlValue::Float),
        ColumnData::Bit(v) => v.map(SqlValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| SqlValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| SqlValue::Uuid(Uuid::from_bytes(*g.as_bytes()))),
        ColumnData::Binary(v) => v.as_ref().map(|b| SqlValue::Bytes(b.to_vec())),
        ColumnData::Numeric(v) => v.map(numeric_value),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&data)?.map(SqlValue::Timestamp)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&data)?.map(SqlValue::Date),
        ColumnData::Time(_) => NaiveTime::from_sql(&data)?.map(SqlValue::Time),
        ColumnData::DateTimeOffset(_) => {
            DateTime::<Utc>::from_sql(&data)?.map(SqlValue::TimestampTz)
        }
        other => bail!("unsupported SQL Server value: {:?}", other),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

fn decode_rows(rows: Vec<Row>) -> Result<Rows> {
    rows.into_iter()
        .map(|row| row.into_iter().map(decode_cell).collect())
        .collect()
}

/// Run one statement on an open session.
///
/// Statements without parameters go out as plain batches so session
/// settings such as `SET IDENTITY_INSERT` persist for later statements.
async fn run(client: &mut MssqlClient, statement: &Statement) -> Result<u64> {
    if statement.params.is_empty() {
        client
            .simple_query(statement.sql.as_str())
            .await?
            .into_results()
            .await?;
        return Ok(0);
    }

    let result = build_query(statement).execute(client).await?;
    Ok(result.total())
}

async fn run_transaction(client: &mut MssqlClient, statements: &[Statement]) -> Result<u64> {
    client.simple_query("BEGIN TRANSACTION").await?.into_results().await?;

    let mut affected = 0u64;
    for statement in statements {
        match run(client, statement).await {
            Ok(n) => affected += n,
            Err(e) => {
                if let Ok(stream) = client.simple_query("IF @@TRANCOUNT > 0 ROLLBACK").await {
                    let _ = stream.into_results().await;
                }
                return Err(e.context("Batch statement failed"));
            }
        }
    }

    client
        .simple_query("COMMIT")
        .await?
        .into_results()
        .await
        .context("Failed to commit transaction")?;
    Ok(affected)
}

#[async_trait]
impl Driver for MssqlDriver {
    async fn query(&self, statement: &Statement) -> Result<Rows> {
        let mut client = self.connect().await?;
        let rows = if statement.params.is_empty() {
            client
                .simple_query(statement.sql.as_str())
                .await?
                .into_first_result()
                .await
        } else {
            build_query(statement)
                .query(&mut client)
                .await?
                .into_first_result()
                .await
        }
        .with_context(|| format!("Query failed: {}", statement.sql))?;

        let _ = client.close().await;
        decode_rows(rows)
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let mut client = self.connect().await?;
        let result = run(&mut client, statement)
            .await
            .with_context(|| format!("Statement failed: {}", statement.sql));
        let _ = client.close().await;
        result
    }

    async fn execute_atomic(&self, statements: &[Statement]) -> Result<u64> {
        let mut client = self.connect().await?;
        let result = run_transaction(&mut client, statements).await;
        let _ = client.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_to_decimal() {
        let n = Numeric::new_with_scale(12345, 2);
        assert_eq!(numeric_value(n), SqlValue::Decimal(Decimal::new(12345, 2)));
    }

    #[test]
    fn test_decode_primitive_cells() {
        assert_eq!(
            decode_cell(ColumnData::I32(Some(42))).unwrap(),
            SqlValue::Int(42)
        );
        assert_eq!(decode_cell(ColumnData::I32(None)).unwrap(), SqlValue::Null);
        assert_eq!(
            decode_cell(ColumnData::Bit(Some(true))).unwrap(),
            SqlValue::Bool(true)
        );
        assert_eq!(
            decode_cell(ColumnData::String(Some("abc".into()))).unwrap(),
            SqlValue::Text("abc".to_string())
        );
    }

    #[cfg(not(any(windows, feature = "mssql-integrated-auth")))]
    #[tokio::test]
    async fn test_integrated_auth_needs_support() {
        let driver = MssqlDriver::new("server=tcp:localhost,1433".to_string(), true);
        let err = driver.connect().await.err().unwrap();
        assert!(err.to_string().contains("trusted authentication"));
    }
}
