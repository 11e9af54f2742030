// ABOUTME: Schema reflector: existence, column definitions, keys, and row counts
// ABOUTME: Reads each dialect's catalog through the normalized queries of SqlDialect

use anyhow::{anyhow, Context};

use crate::connection::ConnectionHandle;
use crate::dialect::Statement;
use crate::error::{ReplicatorError, Result};
use crate::schema::{ColumnDescriptor, ForeignKeyRef, TableSchema};
use crate::table_ref::TableReference;
use crate::value::SqlValue;

/// Catalog reader bound to one connection.
pub struct SchemaReflector<'a> {
    conn: &'a ConnectionHandle,
}

fn text(value: Option<&SqlValue>) -> Option<String> {
    value.and_then(|v| v.render_text())
}

fn flag(value: Option<&SqlValue>) -> bool {
    value.and_then(|v| v.as_i64()).unwrap_or(0) != 0
}

fn number(value: Option<&SqlValue>) -> Option<i64> {
    value.and_then(|v| v.as_i64())
}

impl<'a> SchemaReflector<'a> {
    pub fn new(conn: &'a ConnectionHandle) -> Self {
        Self { conn }
    }

    /// Whether the table exists in its schema, or in the connection's
    /// current schema when unqualified.
    pub async fn exists(&self, table: &TableReference) -> Result<bool> {
        let rows = self
            .conn
            .query(&self.conn.sql().exists_query(table))
            .await
            .context("existence check failed")
            .map_err(|e| ReplicatorError::schema(table, e))?;

        Ok(number(rows.first().and_then(|r| r.first())).unwrap_or(0) > 0)
    }

    /// Reflect columns in ordinal order, the primary key in key order, and
    /// foreign keys. An absent table is a schema error.
    pub async fn reflect(&self, table: &TableReference) -> Result<TableSchema> {
        if !self.exists(table).await? {
            return Err(ReplicatorError::schema(
                table,
                anyhow!("table does not exist"),
            ));
        }

        self.read_schema(table)
            .await
            .map_err(|e| ReplicatorError::schema(table, e))
    }

    async fn read_schema(&self, table: &TableReference) -> anyhow::Result<TableSchema> {
        let sql = self.conn.sql();

        let column_rows = self
            .query(sql.columns_query(table))
            .await
            .context("failed to read columns")?;
        let mut columns = Vec::with_capacity(column_rows.len());
        for row in &column_rows {
            let name = text(row.first())
                .map(|n| sql.from_catalog_name(&n))
                .ok_or_else(|| anyhow!("catalog returned a column without a name"))?;
            let native = text(row.get(1)).unwrap_or_default();
            let logical = sql.logical_type(
                &native,
                number(row.get(2)),
                number(row.get(3)),
                number(row.get(4)),
            );

            let mut column = ColumnDescriptor::new(name, logical);
            column.native_type = native;
            column.nullable = flag(row.get(5));
            column.default = text(row.get(6))
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
            column.autoincrement = flag(row.get(7));
            columns.push(column);
        }

        if columns.is_empty() {
            anyhow::bail!("catalog reported no columns");
        }

        let key: Vec<String> = self
            .query(sql.primary_key_query(table))
            .await
            .context("failed to read primary key")?
            .iter()
            .filter_map(|row| text(row.first()))
            .map(|n| sql.from_catalog_name(&n))
            .collect();

        for row in self
            .query(sql.foreign_keys_query(table))
            .await
            .context("failed to read foreign keys")?
        {
            let (Some(column), Some(ref_table)) = (text(row.first()), text(row.get(1))) else {
                continue;
            };
            let column = sql.from_catalog_name(&column);
            if let Some(descriptor) = columns.iter_mut().find(|c| c.name == column) {
                descriptor.foreign_key = Some(ForeignKeyRef {
                    table: sql.from_catalog_name(&ref_table),
                    column: text(row.get(2))
                        .map(|c| sql.from_catalog_name(&c))
                        .unwrap_or_default(),
                });
            }
        }

        let schema = TableSchema::new(self.conn.dialect(), columns).with_primary_key(key);
        tracing::debug!(
            "Reflected {}: {} column(s), key {:?}",
            table,
            schema.columns.len(),
            schema.primary_key
        );
        Ok(schema)
    }

    /// Row count, or 0 without querying when the table does not exist.
    pub async fn count(&self, table: &TableReference) -> Result<u64> {
        if !self.exists(table).await? {
            return Ok(0);
        }

        let rows = self
            .conn
            .query(&Statement::plain(self.conn.sql().count_sql(table)))
            .await
            .context("row count failed")
            .map_err(|e| ReplicatorError::schema(table, e))?;

        let count = number(rows.first().and_then(|r| r.first()))
            .ok_or_else(|| ReplicatorError::schema(table, anyhow!("row count returned no value")))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn query(&self, statement: Statement) -> anyhow::Result<crate::drivers::Rows> {
        self.conn.query(&statement).await
    }
}
