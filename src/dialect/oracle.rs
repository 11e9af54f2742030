// ABOUTME: Oracle dialect: EZConnect strings and ALL_* dictionary catalog SQL
// ABOUTME: Upper-case catalog names, :n placeholders, OFFSET/FETCH pages, INSERT ALL batches

use anyhow::Result;

use super::{
    bounded, catalog_params, chunked_inserts, column_list, require_host, select_list,
    ConnectionString, Dialect, SqlDialect, Statement,
};
use crate::config::EndpointConfig;
use crate::schema::{ColumnDescriptor, LogicalType};
use crate::table_ref::TableReference;
use crate::value::SqlValue;

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

const OWNER_FILTER: &str = "NVL(:1, SYS_CONTEXT('USERENV', 'CURRENT_SCHEMA'))";

impl SqlDialect for OracleDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Oracle
    }

    fn default_port(&self) -> Option<u16> {
        Some(1521)
    }

    fn connection_string(&self, endpoint: &EndpointConfig) -> Result<ConnectionString> {
        let host = require_host(endpoint)?;
        let port = endpoint.port.or(self.default_port()).unwrap_or(1521);
        let connect = format!("//{}:{}/{}", host, port, endpoint.database);
        let user = endpoint.username.clone().unwrap_or_default();
        let redacted = format!("oracle://{}@{}:{}/{}", user, host, port, endpoint.database);

        Ok(ConnectionString::new(connect, redacted)
            .with_credentials(Some(user), endpoint.password.clone()))
    }

    fn to_catalog_name(&self, name: &str) -> String {
        let has_upper = name.chars().any(|c| c.is_uppercase());
        if has_upper {
            name.to_string()
        } else {
            name.to_uppercase()
        }
    }

    fn from_catalog_name(&self, name: &str) -> String {
        let has_lower = name.chars().any(|c| c.is_lowercase());
        if has_lower {
            name.to_string()
        } else {
            name.to_lowercase()
        }
    }

    fn quote_ident(&self, name: &str) -> String {
        let name = self.to_catalog_name(name);
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn placeholder(&self, index: usize) -> String {
        format!(":{}", index)
    }

    fn ping_sql(&self) -> &'static str {
        "SELECT 1 FROM DUAL"
    }

    fn exists_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT COUNT(*) FROM ALL_TABLES WHERE OWNER = {} AND TABLE_NAME = :2",
                OWNER_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn columns_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT COLUMN_NAME, DATA_TYPE, CHAR_LENGTH, DATA_PRECISION, DATA_SCALE, \
                        CASE NULLABLE WHEN 'Y' THEN 1 ELSE 0 END, \
                        DATA_DEFAULT, \
                        CASE IDENTITY_COLUMN WHEN 'YES' THEN 1 ELSE 0 END \
                 FROM ALL_TAB_COLUMNS \
                 WHERE OWNER = {} AND TABLE_NAME = :2 \
                 ORDER BY COLUMN_ID",
                OWNER_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn primary_key_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT cc.COLUMN_NAME \
                 FROM ALL_CONSTRAINTS c \
                 JOIN ALL_CONS_COLUMNS cc \
                   ON cc.OWNER = c.OWNER AND cc.CONSTRAINT_NAME = c.CONSTRAINT_NAME \
                 WHERE c.CONSTRAINT_TYPE = 'P' \
                   AND c.OWNER = {} AND c.TABLE_NAME = :2 \
                 ORDER BY cc.POSITION",
                OWNER_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn foreign_keys_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT cc.COLUMN_NAME, rc.TABLE_NAME, rc.COLUMN_NAME \
                 FROM ALL_CONSTRAINTS c \
                 JOIN ALL_CONS_COLUMNS cc \
                   ON cc.OWNER = c.OWNER AND cc.CONSTRAINT_NAME = c.CONSTRAINT_NAME \
                 JOIN ALL_CONS_COLUMNS rc \
                   ON rc.OWNER = c.R_OWNER AND rc.CONSTRAINT_NAME = c.R_CONSTRAINT_NAME \
                  AND rc.POSITION = cc.POSITION \
                 WHERE c.CONSTRAINT_TYPE = 'R' \
                   AND c.OWNER = {} AND c.TABLE_NAME = :2 \
                 ORDER BY c.CONSTRAINT_NAME, cc.POSITION",
                OWNER_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn page_query(
        &self,
        table: &TableReference,
        columns: &[ColumnDescriptor],
        order_by: &str,
        offset: u64,
        limit: u64,
    ) -> String {
        format!(
            "SELECT {} FROM {} ORDER BY {} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            select_list(self, columns),
            self.qualified_name(table),
            self.quote_ident(order_by),
            offset,
            limit
        )
    }

    fn logical_type(
        &self,
        native: &str,
        length: Option<i64>,
        precision: Option<i64>,
        scale: Option<i64>,
    ) -> LogicalType {
        let upper = native.trim().to_ascii_uppercase();
        if upper.starts_with("TIMESTAMP") {
            return if upper.contains("TIME ZONE") {
                LogicalType::TimestampTz
            } else {
                LogicalType::Timestamp
            };
        }

        match upper.as_str() {
            "NUMBER" => number_type(precision, scale),
            "FLOAT" | "BINARY_DOUBLE" => LogicalType::Double,
            "BINARY_FLOAT" => LogicalType::Real,
            "CHAR" | "NCHAR" => LogicalType::Char {
                length: bounded(length),
            },
            "VARCHAR2" | "NVARCHAR2" | "VARCHAR" => LogicalType::Varchar {
                length: bounded(length),
            },
            "CLOB" | "NCLOB" | "LONG" => LogicalType::Text,
            "BLOB" | "RAW" | "LONG RAW" => LogicalType::Binary,
            // DATE carries a time of day
            "DATE" => LogicalType::Timestamp,
            "JSON" => LogicalType::Json,
            _ => LogicalType::Other(native.trim().to_string()),
        }
    }

    fn column_type(&self, ty: &LogicalType, key: bool) -> Option<String> {
        let rendered = match ty {
            LogicalType::Boolean => "NUMBER(1)".to_string(),
            LogicalType::SmallInt => "NUMBER(5)".to_string(),
            LogicalType::Integer => "NUMBER(10)".to_string(),
            LogicalType::BigInt => "NUMBER(19)".to_string(),
            LogicalType::Real => "BINARY_FLOAT".to_string(),
            LogicalType::Double => "BINARY_DOUBLE".to_string(),
            LogicalType::Decimal {
                precision: Some(p),
                scale,
            } => {
                let p = (*p).min(38);
                format!("NUMBER({},{})", p, scale.unwrap_or(0).min(p))
            }
            LogicalType::Decimal { .. } => "NUMBER".to_string(),
            LogicalType::Char { length: Some(n) } if *n <= 2000 => format!("CHAR({} CHAR)", n),
            LogicalType::Varchar { length: Some(n) } if *n <= 4000 => {
                format!("VARCHAR2({} CHAR)", n)
            }
            LogicalType::Char { .. } | LogicalType::Varchar { .. } | LogicalType::Text
                if key =>
            {
                "VARCHAR2(1000 CHAR)".to_string()
            }
            LogicalType::Char { .. } | LogicalType::Varchar { .. } | LogicalType::Text => {
                "CLOB".to_string()
            }
            LogicalType::Binary if key => "RAW(2000)".to_string(),
            LogicalType::Binary => "BLOB".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Time => "VARCHAR2(32)".to_string(),
            LogicalType::Timestamp => "TIMESTAMP(9)".to_string(),
            LogicalType::TimestampTz => "TIMESTAMP(9) WITH TIME ZONE".to_string(),
            LogicalType::Uuid => "VARCHAR2(36)".to_string(),
            LogicalType::Json => "CLOB".to_string(),
            LogicalType::Other(_) => return None,
        };
        Some(rendered)
    }

    fn identity_clause(&self, _key: bool) -> Option<&'static str> {
        Some("GENERATED BY DEFAULT AS IDENTITY")
    }

    fn max_bind_params(&self) -> usize {
        32000
    }

    fn max_rows_per_insert(&self) -> usize {
        1000
    }

    fn insert_statements(
        &self,
        table: &TableReference,
        columns: &[ColumnDescriptor],
        rows: &[Vec<SqlValue>],
        _identity: bool,
    ) -> Vec<Statement> {
        let into = format!(
            "INTO {} ({}) VALUES ",
            self.qualified_name(table),
            column_list(self, columns)
        );
        chunked_inserts(self, columns, rows, |tuples| {
            let mut sql = String::from("INSERT ALL");
            for tuple in tuples {
                sql.push(' ');
                sql.push_str(&into);
                sql.push_str(tuple);
            }
            sql.push_str(" SELECT 1 FROM DUAL");
            sql
        })
    }
}

fn number_type(precision: Option<i64>, scale: Option<i64>) -> LogicalType {
    match (precision, scale) {
        (None, None) => LogicalType::Decimal {
            precision: None,
            scale: None,
        },
        // INTEGER is stored as NUMBER(*,0)
        (None, Some(0)) => LogicalType::Decimal {
            precision: Some(38),
            scale: Some(0),
        },
        (Some(p), Some(0)) | (Some(p), None) if p <= 4 => LogicalType::SmallInt,
        (Some(p), Some(0)) | (Some(p), None) if p <= 9 => LogicalType::Integer,
        (Some(p), Some(0)) | (Some(p), None) if p <= 18 => LogicalType::BigInt,
        (p, s) => LogicalType::Decimal {
            precision: bounded(p),
            scale: s.and_then(|s| u32::try_from(s).ok()),
        },
    }
}
