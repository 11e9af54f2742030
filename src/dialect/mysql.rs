// ABOUTME: MySQL/MariaDB dialect: URL connection strings and information_schema catalog SQL
// ABOUTME: Backtick identifiers, ? placeholders, DATABASE() as the current schema

use anyhow::{Context, Result};
use url::Url;

use super::{
    bounded, catalog_params, quote_with, require_host, split_type_args, ConnectionString, Dialect,
    SqlDialect, Statement,
};
use crate::config::EndpointConfig;
use crate::schema::LogicalType;
use crate::table_ref::TableReference;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

const SCHEMA_FILTER: &str = "COALESCE(?, DATABASE())";

impl SqlDialect for MySqlDialect {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    fn default_port(&self) -> Option<u16> {
        Some(3306)
    }

    fn connection_string(&self, endpoint: &EndpointConfig) -> Result<ConnectionString> {
        let host = require_host(endpoint)?;
        let port = endpoint.port.or(self.default_port()).unwrap_or(3306);

        let mut url = Url::parse(&format!("mysql://{}", host))
            .with_context(|| format!("invalid host '{}'", host))?;
        url.set_port(Some(port))
            .map_err(|_| anyhow::anyhow!("cannot set port on '{}'", host))?;
        url.set_path(&endpoint.database);
        if let Some(user) = endpoint.username.as_deref().filter(|u| !u.is_empty()) {
            url.set_username(user)
                .map_err(|_| anyhow::anyhow!("cannot set username on '{}'", host))?;
        }

        let mut redacted = url.clone();
        if let Some(password) = endpoint.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| anyhow::anyhow!("cannot set password on '{}'", host))?;
            let _ = redacted.set_password(Some("***"));
        }

        Ok(
            ConnectionString::new(url.to_string(), redacted.to_string())
                .with_credentials(endpoint.username.clone(), endpoint.password.clone()),
        )
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_with(name, '`', '`')
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn exists_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT COUNT(*) FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = ?",
                SCHEMA_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn columns_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT COLUMN_NAME, COLUMN_TYPE, \
                        CAST(CHARACTER_MAXIMUM_LENGTH AS SIGNED), \
                        CAST(NUMERIC_PRECISION AS SIGNED), \
                        CAST(NUMERIC_SCALE AS SIGNED), \
                        CASE WHEN IS_NULLABLE = 'YES' THEN 1 ELSE 0 END, \
                        COLUMN_DEFAULT, \
                        CASE WHEN EXTRA LIKE '%auto_increment%' THEN 1 ELSE 0 END \
                 FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                SCHEMA_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn primary_key_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT COLUMN_NAME FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE CONSTRAINT_NAME = 'PRIMARY' \
                   AND TABLE_SCHEMA = {} AND TABLE_NAME = ? \
                 ORDER BY ORDINAL_POSITION",
                SCHEMA_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn foreign_keys_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
                 FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE REFERENCED_TABLE_NAME IS NOT NULL \
                   AND TABLE_SCHEMA = {} AND TABLE_NAME = ? \
                 ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION",
                SCHEMA_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn logical_type(
        &self,
        native: &str,
        length: Option<i64>,
        precision: Option<i64>,
        scale: Option<i64>,
    ) -> LogicalType {
        let (base, args) = split_type_args(native);
        let unsigned = base.contains("unsigned");
        let base = base
            .replace("unsigned", "")
            .replace("zerofill", "")
            .trim()
            .to_string();

        match base.as_str() {
            "tinyint" if args.first() == Some(&1) => LogicalType::Boolean,
            "bool" | "boolean" => LogicalType::Boolean,
            "tinyint" | "smallint" | "year" => LogicalType::SmallInt,
            "mediumint" | "int" | "integer" if unsigned => LogicalType::BigInt,
            "mediumint" | "int" | "integer" => LogicalType::Integer,
            "bigint" if unsigned => LogicalType::Decimal {
                precision: Some(20),
                scale: Some(0),
            },
            "bigint" => LogicalType::BigInt,
            "float" => LogicalType::Real,
            "double" | "double precision" | "real" => LogicalType::Double,
            "decimal" | "numeric" => LogicalType::Decimal {
                precision: bounded(precision),
                scale: scale.and_then(|s| u32::try_from(s).ok()),
            },
            "char" => LogicalType::Char {
                length: bounded(length),
            },
            "varchar" => LogicalType::Varchar {
                length: bounded(length),
            },
            "tinytext" | "text" | "mediumtext" | "longtext" => LogicalType::Text,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob" => {
                LogicalType::Binary
            }
            "date" => LogicalType::Date,
            "time" => LogicalType::Time,
            "datetime" | "timestamp" => LogicalType::Timestamp,
            "json" => LogicalType::Json,
            _ => LogicalType::Other(native.trim().to_string()),
        }
    }

    fn column_type(&self, ty: &LogicalType, key: bool) -> Option<String> {
        let rendered = match ty {
            LogicalType::Boolean => "TINYINT(1)".to_string(),
            LogicalType::SmallInt => "SMALLINT".to_string(),
            LogicalType::Integer => "INT".to_string(),
            LogicalType::BigInt => "BIGINT".to_string(),
            LogicalType::Real => "FLOAT".to_string(),
            LogicalType::Double => "DOUBLE".to_string(),
            LogicalType::Decimal {
                precision: Some(p),
                scale,
            } => {
                let p = (*p).min(65);
                format!("DECIMAL({},{})", p, scale.unwrap_or(0).min(30).min(p))
            }
            LogicalType::Decimal { .. } => "DECIMAL(65,30)".to_string(),
            LogicalType::Char { length: Some(n) } if *n <= 255 => format!("CHAR({})", n),
            LogicalType::Char { .. } if key => "VARCHAR(255)".to_string(),
            LogicalType::Char { .. } => "LONGTEXT".to_string(),
            LogicalType::Varchar { length: Some(n) } if *n <= 16383 => format!("VARCHAR({})", n),
            LogicalType::Varchar { .. } | LogicalType::Text if key => "VARCHAR(255)".to_string(),
            LogicalType::Varchar { .. } | LogicalType::Text => "LONGTEXT".to_string(),
            LogicalType::Binary if key => "VARBINARY(255)".to_string(),
            LogicalType::Binary => "LONGBLOB".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Time => "TIME(6)".to_string(),
            LogicalType::Timestamp | LogicalType::TimestampTz => "DATETIME(6)".to_string(),
            LogicalType::Uuid => "CHAR(36)".to_string(),
            LogicalType::Json => "JSON".to_string(),
            LogicalType::Other(_) => return None,
        };
        Some(rendered)
    }

    fn identity_clause(&self, key: bool) -> Option<&'static str> {
        // AUTO_INCREMENT is only legal on indexed columns
        key.then_some("AUTO_INCREMENT")
    }

    fn max_bind_params(&self) -> usize {
        65000
    }

    fn max_rows_per_insert(&self) -> usize {
        usize::MAX
    }
}
