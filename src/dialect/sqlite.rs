// ABOUTME: SQLite dialect: file-path connections and pragma-based catalog SQL
// ABOUTME: Declared-type affinity mapping, DELETE FROM truncation, 999-parameter batches

use anyhow::{bail, Result};

use super::{quote_with, split_type_args, ConnectionString, Dialect, SqlDialect, Statement};
use crate::config::EndpointConfig;
use crate::schema::LogicalType;
use crate::table_ref::TableReference;
use crate::value::SqlValue;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

const DEFAULT_SCHEMA: &str = "main";

impl SqliteDialect {
    fn schema_name<'a>(&self, table: &'a TableReference) -> &'a str {
        table.schema().unwrap_or(DEFAULT_SCHEMA)
    }

    /// `(table, schema)` arguments for the table-valued pragma functions.
    fn pragma_params(&self, table: &TableReference) -> Vec<SqlValue> {
        vec![
            SqlValue::Text(table.name().to_string()),
            SqlValue::Text(self.schema_name(table).to_string()),
        ]
    }
}

impl SqlDialect for SqliteDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn default_port(&self) -> Option<u16> {
        None
    }

    fn connection_string(&self, endpoint: &EndpointConfig) -> Result<ConnectionString> {
        let path = endpoint.database.trim();
        if path.is_empty() {
            bail!("sqlite database path cannot be empty");
        }
        Ok(ConnectionString::new(path, format!("sqlite://{}", path)))
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_with(name, '"', '"')
    }

    fn placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn exists_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?",
                self.quote_ident(self.schema_name(table))
            ),
            vec![SqlValue::Text(table.name().to_string())],
        )
    }

    fn columns_query(&self, table: &TableReference) -> Statement {
        // a lone INTEGER PRIMARY KEY aliases the rowid and is auto-assigned
        Statement::new(
            "SELECT name, type, NULL, NULL, NULL, \
                    CASE WHEN \"notnull\" = 0 AND pk = 0 THEN 1 ELSE 0 END, \
                    dflt_value, \
                    CASE WHEN pk = 1 AND lower(type) = 'integer' \
                          AND (SELECT COUNT(*) FROM pragma_table_info(?1, ?2) WHERE pk > 0) = 1 \
                         THEN 1 ELSE 0 END \
             FROM pragma_table_info(?1, ?2) \
             ORDER BY cid",
            self.pragma_params(table),
        )
    }

    fn primary_key_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            "SELECT name FROM pragma_table_info(?1, ?2) WHERE pk > 0 ORDER BY pk",
            self.pragma_params(table),
        )
    }

    fn foreign_keys_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            "SELECT \"from\", \"table\", COALESCE(\"to\", '') \
             FROM pragma_foreign_key_list(?1, ?2) \
             ORDER BY id, seq",
            self.pragma_params(table),
        )
    }

    fn truncate_sql(&self, table: &TableReference) -> String {
        format!("DELETE FROM {}", self.qualified_name(table))
    }

    fn logical_type(
        &self,
        native: &str,
        length: Option<i64>,
        precision: Option<i64>,
        scale: Option<i64>,
    ) -> LogicalType {
        let (base, args) = split_type_args(native);
        let first = args.first().copied().or(length).or(precision);
        let second = args.get(1).copied().or(scale);
        let positive = |v: Option<i64>| v.filter(|n| *n > 0).and_then(|n| u32::try_from(n).ok());

        match base.as_str() {
            // no declared type: values keep whatever storage class they arrive with
            "" => LogicalType::Text,
            "boolean" | "bool" => LogicalType::Boolean,
            "tinyint" | "smallint" | "int2" => LogicalType::SmallInt,
            "int" | "mediumint" | "int4" => LogicalType::Integer,
            "integer" | "bigint" | "int8" | "unsigned big int" => LogicalType::BigInt,
            "real" | "double" | "double precision" | "float" => LogicalType::Double,
            "numeric" | "decimal" => LogicalType::Decimal {
                precision: positive(first),
                scale: second.and_then(|s| u32::try_from(s).ok()),
            },
            "char" | "character" | "nchar" | "native character" => LogicalType::Char {
                length: positive(first),
            },
            "varchar" | "nvarchar" | "character varying" | "varying character" => {
                LogicalType::Varchar {
                    length: positive(first),
                }
            }
            "text" | "clob" => LogicalType::Text,
            "blob" => LogicalType::Binary,
            "date" => LogicalType::Date,
            "time" => LogicalType::Time,
            "datetime" | "timestamp" => LogicalType::Timestamp,
            "timestamptz" | "timestamp with time zone" => LogicalType::TimestampTz,
            "uuid" => LogicalType::Uuid,
            "json" | "jsonb" => LogicalType::Json,
            other if other.contains("int") => LogicalType::BigInt,
            other if other.contains("char") || other.contains("clob") || other.contains("text") => {
                LogicalType::Text
            }
            other if other.contains("blob") => LogicalType::Binary,
            other if other.contains("real") || other.contains("floa") || other.contains("doub") => {
                LogicalType::Double
            }
            _ => LogicalType::Other(native.trim().to_string()),
        }
    }

    fn column_type(&self, ty: &LogicalType, _key: bool) -> Option<String> {
        let rendered = match ty {
            LogicalType::Boolean => "BOOLEAN".to_string(),
            LogicalType::SmallInt => "SMALLINT".to_string(),
            // INTEGER keeps a single-column key a rowid alias
            LogicalType::Integer | LogicalType::BigInt => "INTEGER".to_string(),
            LogicalType::Real | LogicalType::Double => "REAL".to_string(),
            LogicalType::Decimal {
                precision: Some(p),
                scale,
            } => format!("NUMERIC({},{})", p, scale.unwrap_or(0)),
            LogicalType::Decimal { .. } => "NUMERIC".to_string(),
            LogicalType::Char { length: Some(n) } => format!("CHAR({})", n),
            LogicalType::Varchar { length: Some(n) } => format!("VARCHAR({})", n),
            LogicalType::Char { length: None }
            | LogicalType::Varchar { length: None }
            | LogicalType::Text => "TEXT".to_string(),
            LogicalType::Binary => "BLOB".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Time => "TIME".to_string(),
            LogicalType::Timestamp => "DATETIME".to_string(),
            LogicalType::TimestampTz => "TIMESTAMPTZ".to_string(),
            LogicalType::Uuid => "UUID".to_string(),
            LogicalType::Json => "JSON".to_string(),
            LogicalType::Other(_) => return None,
        };
        Some(rendered)
    }

    fn identity_clause(&self, _key: bool) -> Option<&'static str> {
        None
    }

    fn max_bind_params(&self) -> usize {
        999
    }

    fn max_rows_per_insert(&self) -> usize {
        500
    }
}
