// ABOUTME: Table materializer: creates a destination table from a reflected source schema
// ABOUTME: Translates column types across dialects and drops foreign keys; also truncates

use anyhow::{anyhow, bail, Context};

use crate::connection::ConnectionHandle;
use crate::dialect::{SqlDialect, Statement};
use crate::error::{ReplicatorError, Result};
use crate::reflect::SchemaReflector;
use crate::schema::{LogicalType, TableSchema};
use crate::table_ref::TableReference;

/// Creates and empties destination tables.
pub struct TableMaterializer<'a> {
    conn: &'a ConnectionHandle,
}

impl<'a> TableMaterializer<'a> {
    pub fn new(conn: &'a ConnectionHandle) -> Self {
        Self { conn }
    }

    /// Create `table` shaped like `source` unless it already exists.
    ///
    /// Returns whether the table was created. The table is created by a
    /// single `CREATE TABLE` statement; foreign keys are never carried over.
    pub async fn ensure(&self, table: &TableReference, source: &TableSchema) -> Result<bool> {
        let reflector = SchemaReflector::new(self.conn);
        if reflector.exists(table).await? {
            tracing::debug!("Table {} already exists", table);
            return Ok(false);
        }

        let ddl = create_table_sql(self.conn.sql(), table, source)
            .map_err(|e| ReplicatorError::schema(table, e))?;
        tracing::debug!("{}", ddl);

        self.conn
            .execute(&Statement::plain(ddl))
            .await
            .context("CREATE TABLE failed")
            .map_err(|e| ReplicatorError::schema(table, e))?;

        tracing::info!("✓ Created table {}", table);
        Ok(true)
    }

    /// Remove every row from `table`. Absent tables are left alone.
    pub async fn truncate(&self, table: &TableReference) -> Result<()> {
        let reflector = SchemaReflector::new(self.conn);
        if !reflector.exists(table).await? {
            tracing::debug!("Table {} does not exist, nothing to truncate", table);
            return Ok(());
        }

        self.conn
            .execute(&Statement::plain(self.conn.sql().truncate_sql(table)))
            .await
            .context("truncate failed")
            .map_err(|e| ReplicatorError::schema(table, e))?;

        tracing::info!("✓ Truncated table {}", table);
        Ok(())
    }
}

/// DDL creating `table` in the destination dialect from a reflected source
/// schema.
///
/// Engine-specific types and default expressions only carry over between
/// identical dialects. Any column that cannot be rendered fails the whole
/// statement before it is issued.
pub fn create_table_sql(
    dest: &dyn SqlDialect,
    table: &TableReference,
    source: &TableSchema,
) -> anyhow::Result<String> {
    if source.columns.is_empty() {
        bail!("source schema has no columns");
    }

    let schema = source.without_foreign_keys();
    let same_dialect = schema.dialect == dest.dialect();
    let mut definitions = Vec::with_capacity(schema.columns.len() + 1);

    for column in &schema.columns {
        let ty = match &column.logical_type {
            LogicalType::Other(native) if same_dialect => native.clone(),
            LogicalType::Other(_) => bail!(
                "column '{}' has {}-specific type '{}' with no {} equivalent",
                column.name,
                schema.dialect,
                column.native_type,
                dest.dialect()
            ),
            portable => dest
                .column_type(portable, column.primary_key)
                .ok_or_else(|| {
                    anyhow!(
                        "column '{}': {} cannot represent {}",
                        column.name,
                        dest.dialect(),
                        portable
                    )
                })?,
        };

        let mut definition = format!("{} {}", dest.quote_ident(&column.name), ty);
        if column.autoincrement {
            if let Some(identity) = dest.identity_clause(column.primary_key) {
                definition.push(' ');
                definition.push_str(identity);
            }
        }
        if !column.nullable || column.primary_key {
            definition.push_str(" NOT NULL");
        }
        if let Some(default) = column.default.as_deref().filter(|_| !column.autoincrement) {
            if same_dialect {
                definition.push_str(" DEFAULT ");
                definition.push_str(default);
            } else {
                tracing::warn!(
                    "Dropping default '{}' on column '{}': {} defaults do not carry over to {}",
                    default,
                    column.name,
                    schema.dialect,
                    dest.dialect()
                );
            }
        }
        definitions.push(definition);
    }

    let key = schema.primary_key_columns();
    if !key.is_empty() {
        let names: Vec<String> = key.iter().map(|c| dest.quote_ident(&c.name)).collect();
        definitions.push(format!("PRIMARY KEY ({})", names.join(", ")));
    }

    Ok(format!(
        "CREATE TABLE {} ({})",
        dest.qualified_name(table),
        definitions.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::schema::{ColumnDescriptor, ForeignKeyRef};

    fn source_schema(dialect: Dialect) -> TableSchema {
        let mut id = ColumnDescriptor::new("id", LogicalType::BigInt);
        id.primary_key = true;
        id.nullable = false;
        id.autoincrement = true;
        id.default = Some("nextval('orders_id_seq'::regclass)".to_string());

        let mut customer = ColumnDescriptor::new("customer_id", LogicalType::Integer);
        customer.foreign_key = Some(ForeignKeyRef {
            table: "customers".to_string(),
            column: "id".to_string(),
        });

        let mut status = ColumnDescriptor::new("status", LogicalType::Varchar { length: Some(20) });
        status.nullable = false;
        status.default = Some("'new'".to_string());

        TableSchema::new(dialect, vec![id, customer, status])
    }

    #[test]
    fn test_same_dialect_keeps_defaults_and_identity() {
        let ddl = create_table_sql(
            Dialect::Postgres.sql(),
            &TableReference::parse("public.orders_copy").unwrap(),
            &source_schema(Dialect::Postgres),
        )
        .unwrap();

        assert!(ddl.starts_with("CREATE TABLE \"public\".\"orders_copy\" ("));
        assert!(ddl.contains("\"id\" BIGINT GENERATED BY DEFAULT AS IDENTITY NOT NULL"));
        assert!(!ddl.contains("nextval"));
        assert!(ddl.contains("\"status\" VARCHAR(20) NOT NULL DEFAULT 'new'"));
        assert!(ddl.ends_with("PRIMARY KEY (\"id\"))"));
    }

    #[test]
    fn test_foreign_keys_are_dropped() {
        let ddl = create_table_sql(
            Dialect::Sqlite.sql(),
            &TableReference::unqualified("orders"),
            &source_schema(Dialect::Sqlite),
        )
        .unwrap();
        assert!(!ddl.to_uppercase().contains("REFERENCES"));
        assert!(ddl.contains("\"customer_id\" INTEGER"));
    }

    #[test]
    fn test_cross_dialect_drops_defaults() {
        let ddl = create_table_sql(
            Dialect::Sqlite.sql(),
            &TableReference::unqualified("orders"),
            &source_schema(Dialect::Postgres),
        )
        .unwrap();
        assert!(!ddl.contains("DEFAULT"));
        assert!(ddl.contains("\"status\" VARCHAR(20) NOT NULL"));
    }

    #[test]
    fn test_engine_specific_type_only_within_dialect() {
        let mut schema = source_schema(Dialect::Postgres);
        schema
            .columns
            .push(ColumnDescriptor::new("area", LogicalType::Other("polygon".to_string())));

        let same = create_table_sql(
            Dialect::Postgres.sql(),
            &TableReference::unqualified("shapes"),
            &schema,
        )
        .unwrap();
        assert!(same.contains("\"area\" polygon"));

        let err = create_table_sql(
            Dialect::MySql.sql(),
            &TableReference::unqualified("shapes"),
            &schema,
        )
        .unwrap_err();
        assert!(err.to_string().contains("polygon"));
    }

    #[test]
    fn test_untranslatable_type_names_catalog_type() {
        let mut schema = source_schema(Dialect::Postgres);
        let mut geom = ColumnDescriptor::new("geom", LogicalType::Other("geometry".to_string()));
        geom.native_type = "geometry(Polygon,4326)".to_string();
        schema.columns.push(geom);

        let err = create_table_sql(
            Dialect::Oracle.sql(),
            &TableReference::unqualified("parcels"),
            &schema,
        )
        .unwrap_err();
        assert!(err.to_string().contains("'geometry(Polygon,4326)'"));
        assert!(err.to_string().contains("geom"));
    }
}
