// ABOUTME: SQL Server dialect: ADO.NET connection strings and INFORMATION_SCHEMA catalog SQL
// ABOUTME: Bracketed identifiers, @Pn placeholders, OFFSET/FETCH pages, IDENTITY_INSERT batches

use anyhow::Result;

use super::{
    bounded, catalog_params, chunked_inserts, column_list, quote_with, require_host, select_list,
    ConnectionString, Dialect, SqlDialect, Statement,
};
use crate::config::EndpointConfig;
use crate::schema::{ColumnDescriptor, LogicalType};
use crate::table_ref::TableReference;
use crate::value::SqlValue;

#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

const SCHEMA_FILTER: &str = "COALESCE(@P1, SCHEMA_NAME())";

/// Quote an ADO.NET connection string value when it contains separators.
fn ado_value(value: &str) -> String {
    if value.contains([';', '\'', '"']) || value.trim() != value {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl SqlDialect for MssqlDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Mssql
    }

    fn default_port(&self) -> Option<u16> {
        Some(1433)
    }

    fn connection_string(&self, endpoint: &EndpointConfig) -> Result<ConnectionString> {
        let host = require_host(endpoint)?;
        let port = endpoint.port.or(self.default_port()).unwrap_or(1433);

        let user = endpoint.username.as_deref().unwrap_or("");
        let password = endpoint.password.as_deref().unwrap_or("");
        let integrated_auth = user.is_empty() && password.is_empty();

        let mut base = format!(
            "server=tcp:{},{};database={}",
            host,
            port,
            ado_value(&endpoint.database)
        );
        let mut dsn;
        let redacted;
        if integrated_auth {
            base.push_str(";IntegratedSecurity=true");
            dsn = base.clone();
            redacted = base;
        } else {
            base.push_str(&format!(";user id={}", ado_value(user)));
            dsn = format!("{};password={}", base, ado_value(password));
            redacted = format!("{};password=***", base);
        }
        let tls = format!(
            ";encrypt={};TrustServerCertificate={}",
            endpoint.encrypt, endpoint.trust_server_certificate
        );
        dsn.push_str(&tls);

        let mut cs = ConnectionString::new(dsn, format!("{}{}", redacted, tls));
        if integrated_auth {
            cs.integrated_auth = true;
        } else {
            cs = cs.with_credentials(Some(user.to_string()), Some(password.to_string()));
        }
        Ok(cs)
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_with(name, '[', ']')
    }

    fn placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn exists_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT CAST(COUNT(*) AS BIGINT) FROM INFORMATION_SCHEMA.TABLES \
                 WHERE TABLE_SCHEMA = {} AND TABLE_NAME = @P2",
                SCHEMA_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn columns_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT CAST(c.COLUMN_NAME AS NVARCHAR(128)), \
                        CAST(c.DATA_TYPE AS NVARCHAR(128)), \
                        CAST(c.CHARACTER_MAXIMUM_LENGTH AS BIGINT), \
                        CAST(c.NUMERIC_PRECISION AS BIGINT), \
                        CAST(c.NUMERIC_SCALE AS BIGINT), \
                        CAST(CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS BIGINT), \
                        CAST(c.COLUMN_DEFAULT AS NVARCHAR(4000)), \
                        CAST(COLUMNPROPERTY(OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME)), \
                                            c.COLUMN_NAME, 'IsIdentity') AS BIGINT) \
                 FROM INFORMATION_SCHEMA.COLUMNS c \
                 WHERE c.TABLE_SCHEMA = {} AND c.TABLE_NAME = @P2 \
                 ORDER BY c.ORDINAL_POSITION",
                SCHEMA_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn primary_key_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            format!(
                "SELECT CAST(kcu.COLUMN_NAME AS NVARCHAR(128)) \
                 FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
                 JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
                   ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME \
                  AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA \
                  AND tc.TABLE_NAME = kcu.TABLE_NAME \
                 WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' \
                   AND tc.TABLE_SCHEMA = {} AND tc.TABLE_NAME = @P2 \
                 ORDER BY kcu.ORDINAL_POSITION",
                SCHEMA_FILTER
            ),
            catalog_params(self, table),
        )
    }

    fn foreign_keys_query(&self, table: &TableReference) -> Statement {
        Statement::new(
            "SELECT CAST(pc.name AS NVARCHAR(128)), CAST(rt.name AS NVARCHAR(128)), \
                    CAST(rc.name AS NVARCHAR(128)) \
             FROM sys.foreign_key_columns fkc \
             JOIN sys.tables t ON t.object_id = fkc.parent_object_id \
             JOIN sys.columns pc ON pc.object_id = fkc.parent_object_id \
                                AND pc.column_id = fkc.parent_column_id \
             JOIN sys.tables rt ON rt.object_id = fkc.referenced_object_id \
             JOIN sys.columns rc ON rc.object_id = fkc.referenced_object_id \
                                AND rc.column_id = fkc.referenced_column_id \
             WHERE t.schema_id = SCHEMA_ID(COALESCE(@P1, SCHEMA_NAME())) AND t.name = @P2 \
             ORDER BY fkc.constraint_object_id, fkc.constraint_column_id",
            catalog_params(self, table),
        )
    }

    fn select_expr(&self, column: &ColumnDescriptor) -> String {
        let quoted = self.quote_ident(&column.name);
        match column.logical_type {
            LogicalType::Other(_) => format!("CAST({} AS NVARCHAR(MAX)) AS {}", quoted, quoted),
            _ => quoted,
        }
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
        match native.trim().to_ascii_lowercase().as_str() {
            "bit" => LogicalType::Boolean,
            "tinyint" | "smallint" => LogicalType::SmallInt,
            "int" => LogicalType::Integer,
            "bigint" => LogicalType::BigInt,
            "real" => LogicalType::Real,
            "float" => LogicalType::Double,
            "decimal" | "numeric" => LogicalType::Decimal {
                precision: bounded(precision),
                scale: scale.and_then(|s| u32::try_from(s).ok()),
            },
            "money" => LogicalType::Decimal {
                precision: Some(19),
                scale: Some(4),
            },
            "smallmoney" => LogicalType::Decimal {
                precision: Some(10),
                scale: Some(4),
            },
            "char" | "nchar" => LogicalType::Char {
                length: bounded(length),
            },
            // length -1 means (MAX)
            "varchar" | "nvarchar" if bounded(length).is_none() => LogicalType::Text,
            "varchar" | "nvarchar" => LogicalType::Varchar {
                length: bounded(length),
            },
            "text" | "ntext" => LogicalType::Text,
            "binary" | "varbinary" | "image" => LogicalType::Binary,
            "date" => LogicalType::Date,
            "time" => LogicalType::Time,
            "datetime" | "datetime2" | "smalldatetime" => LogicalType::Timestamp,
            "datetimeoffset" => LogicalType::TimestampTz,
            "uniqueidentifier" => LogicalType::Uuid,
            _ => LogicalType::Other(native.trim().to_string()),
        }
    }

    fn column_type(&self, ty: &LogicalType, key: bool) -> Option<String> {
        let rendered = match ty {
            LogicalType::Boolean => "BIT".to_string(),
            LogicalType::SmallInt => "SMALLINT".to_string(),
            LogicalType::Integer => "INT".to_string(),
            LogicalType::BigInt => "BIGINT".to_string(),
            LogicalType::Real => "REAL".to_string(),
            LogicalType::Double => "FLOAT".to_string(),
            LogicalType::Decimal {
                precision: Some(p),
                scale,
            } => {
                let p = (*p).min(38);
                format!("DECIMAL({},{})", p, scale.unwrap_or(0).min(p))
            }
            LogicalType::Decimal { .. } => "DECIMAL(38,10)".to_string(),
            LogicalType::Char { length: Some(n) } if *n <= 4000 => format!("NCHAR({})", n),
            LogicalType::Varchar { length: Some(n) } if *n <= 4000 => {
                format!("NVARCHAR({})", n)
            }
            LogicalType::Char { .. } | LogicalType::Varchar { .. } | LogicalType::Text
                if key =>
            {
                "NVARCHAR(450)".to_string()
            }
            LogicalType::Char { .. } | LogicalType::Varchar { .. } | LogicalType::Text => {
                "NVARCHAR(MAX)".to_string()
            }
            LogicalType::Binary if key => "VARBINARY(900)".to_string(),
            LogicalType::Binary => "VARBINARY(MAX)".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Time => "TIME(7)".to_string(),
            LogicalType::Timestamp => "DATETIME2(7)".to_string(),
            LogicalType::TimestampTz => "DATETIMEOFFSET(7)".to_string(),
            LogicalType::Uuid => "UNIQUEIDENTIFIER".to_string(),
            LogicalType::Json => "NVARCHAR(MAX)".to_string(),
            LogicalType::Other(_) => return None,
        };
        Some(rendered)
    }

    fn identity_clause(&self, _key: bool) -> Option<&'static str> {
        Some("IDENTITY(1,1)")
    }

    fn max_bind_params(&self) -> usize {
        2000
    }

    fn max_rows_per_insert(&self) -> usize {
        1000
    }

    fn insert_statements(
        &self,
        table: &TableReference,
        columns: &[ColumnDescriptor],
        rows: &[Vec<SqlValue>],
        identity: bool,
    ) -> Vec<Statement> {
        let target = self.qualified_name(table);
        let column_list = column_list(self, columns);
        let inserts = chunked_inserts(self, columns, rows, |tuples| {
            format!(
                "INSERT INTO {} ({}) VALUES {}",
                target,
                column_list,
                tuples.join(", ")
            )
        });

        if !identity || inserts.is_empty() {
            return inserts;
        }

        let mut statements = Vec::with_capacity(inserts.len() + 2);
        statements.push(Statement::plain(format!(
            "SET IDENTITY_INSERT {} ON",
            target
        )));
        statements.extend(inserts);
        statements.push(Statement::plain(format!(
            "SET IDENTITY_INSERT {} OFF",
            target
        )));
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(username: Option<&str>, password: Option<&str>) -> EndpointConfig {
        EndpointConfig {
            db_type: "sqlserver".to_string(),
            host: Some("sql01".to_string()),
            port: None,
            database: "Sales".to_string(),
            username: username.map(String::from),
            password: password.map(String::from),
            table: "dbo.Orders".to_string(),
            connect_retries: 0,
            encrypt: false,
            trust_server_certificate: true,
        }
    }

    #[test]
    fn test_connection_string_with_credentials() {
        let cs = MssqlDialect
            .connection_string(&endpoint(Some("sa"), Some("a;b")))
            .unwrap();
        assert_eq!(
            cs.dsn,
            "server=tcp:sql01,1433;database=Sales;user id=sa;password=\"a;b\";encrypt=false;TrustServerCertificate=true"
        );
        assert!(!cs.integrated_auth);
        assert!(!cs.to_string().contains("a;b"));
        assert!(cs.to_string().contains("password=***"));
    }

    #[test]
    fn test_connection_string_trusted_auth_when_credentials_empty() {
        let cs = MssqlDialect
            .connection_string(&endpoint(Some(""), None))
            .unwrap();
        assert!(cs.integrated_auth);
        assert!(cs.dsn.contains("IntegratedSecurity=true"));
        assert!(!cs.dsn.contains("user id"));
    }

    #[test]
    fn test_page_query_uses_offset_fetch() {
        let table = TableReference::qualified("dbo", "Orders");
        let columns = vec![ColumnDescriptor::new("OrderID", LogicalType::Integer)];
        assert_eq!(
            MssqlDialect.page_query(&table, &columns, "OrderID", 0, 1000),
            "SELECT [OrderID] FROM [dbo].[Orders] ORDER BY [OrderID] OFFSET 0 ROWS FETCH NEXT 1000 ROWS ONLY"
        );
    }

    #[test]
    fn test_max_length_strings_reflect_as_text() {
        assert_eq!(
            MssqlDialect.logical_type("nvarchar", Some(-1), None, None),
            LogicalType::Text
        );
        assert_eq!(
            MssqlDialect.logical_type("nvarchar", Some(50), None, None),
            LogicalType::Varchar { length: Some(50) }
        );
        assert_eq!(
            MssqlDialect.column_type(&LogicalType::Text, true).as_deref(),
            Some("NVARCHAR(450)")
        );
    }

    #[test]
    fn test_identity_batches_are_wrapped() {
        let table = TableReference::qualified("dbo", "Orders");
        let columns = vec![ColumnDescriptor::new("OrderID", LogicalType::Integer)];
        let rows: Vec<Vec<SqlValue>> = (0..2500).map(|i| vec![SqlValue::Int(i)]).collect();
        let statements = MssqlDialect.insert_statements(&table, &columns, &rows, true);

        // 1000 rows per VALUES list: 3 inserts plus ON/OFF
        assert_eq!(statements.len(), 5);
        assert_eq!(statements[0].sql, "SET IDENTITY_INSERT [dbo].[Orders] ON");
        assert_eq!(statements[4].sql, "SET IDENTITY_INSERT [dbo].[Orders] OFF");
        assert!(statements[1].sql.contains("@P1000)"));
        assert!(!statements[1].sql.contains("@P1001"));
        assert_eq!(statements[3].params.len(), 500);
    }
}
