// ABOUTME: Reflected table structure: columns, logical types, keys, and batch rows
// ABOUTME: Shared by the reflector, materializer, and transfer engine

use std::fmt;

use anyhow::{bail, Result};

use crate::dialect::Dialect;
use crate::value::SqlValue;

/// Dialect-neutral column type.
///
/// Each dialect maps its native type names onto this set when reflecting and
/// renders it back as DDL when materializing a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Char {
        length: Option<u32>,
    },
    Varchar {
        length: Option<u32>,
    },
    Text,
    Binary,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    /// A native type with no portable equivalent, kept verbatim.
    Other(String),
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Decimal {
                precision: Some(p),
                scale,
            } => write!(f, "decimal({},{})", p, scale.unwrap_or(0)),
            LogicalType::Decimal { .. } => f.write_str("decimal"),
            LogicalType::Char { length: Some(n) } => write!(f, "char({})", n),
            LogicalType::Varchar { length: Some(n) } => write!(f, "varchar({})", n),
            LogicalType::Other(native) => write!(f, "{} (native)", native),
            other => write!(f, "{}", format!("{:?}", other).to_lowercase()),
        }
    }
}

/// Column referenced by a foreign key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// One reflected column. Produced by a reflection call and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub logical_type: LogicalType,
    /// Type name as reported by the source catalog.
    pub native_type: String,
    pub nullable: bool,
    pub primary_key: bool,
    /// Default expression, verbatim in the source dialect.
    pub default: Option<String>,
    pub autoincrement: bool,
    pub foreign_key: Option<ForeignKeyRef>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        let native_type = logical_type.to_string();
        Self {
            name: name.into(),
            logical_type,
            native_type,
            nullable: true,
            primary_key: false,
            default: None,
            autoincrement: false,
            foreign_key: None,
        }
    }
}

/// Ordered columns of a table plus the dialect they were reflected from.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub dialect: Dialect,
    pub columns: Vec<ColumnDescriptor>,
    /// Primary-key column names in key order.
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Build a schema whose key is the flagged columns in column order.
    pub fn new(dialect: Dialect, columns: Vec<ColumnDescriptor>) -> Self {
        let primary_key = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        Self {
            dialect,
            columns,
            primary_key,
        }
    }

    /// Replace the key order, flagging exactly the named columns.
    pub fn with_primary_key(mut self, key: Vec<String>) -> Self {
        for column in &mut self.columns {
            column.primary_key = key.contains(&column.name);
        }
        self.primary_key = key
            .into_iter()
            .filter(|name| self.columns.iter().any(|c| &c.name == name))
            .collect();
        self
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key_columns(&self) -> Vec<&ColumnDescriptor> {
        self.primary_key
            .iter()
            .filter_map(|name| self.column(name))
            .collect()
    }

    /// Column used to impose a deterministic order on paginated reads: the
    /// first primary-key column, or the first column when there is no key.
    pub fn ordering_column(&self) -> Option<&ColumnDescriptor> {
        self.primary_key_columns()
            .first()
            .copied()
            .or_else(|| self.columns.first())
    }

    /// Copy of this schema with every foreign-key reference removed.
    pub fn without_foreign_keys(&self) -> TableSchema {
        let columns = self
            .columns
            .iter()
            .cloned()
            .map(|mut c| {
                c.foreign_key = None;
                c
            })
            .collect();
        TableSchema {
            dialect: self.dialect,
            columns,
            primary_key: self.primary_key.clone(),
        }
    }
}

/// One fetched row, keyed by column name in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    cells: Vec<(String, SqlValue)>,
}

impl BatchRow {
    /// Zip a fetched tuple with the schema's column order.
    ///
    /// Each value is conformed to its column's logical type. A tuple whose
    /// width differs from the column count is rejected.
    pub fn from_tuple(schema: &TableSchema, values: Vec<SqlValue>) -> Result<Self> {
        Self::zip(schema, values, true)
    }

    /// Like [`BatchRow::from_tuple`], but keeps every value exactly as the
    /// driver decoded it.
    pub fn verbatim(schema: &TableSchema, values: Vec<SqlValue>) -> Result<Self> {
        Self::zip(schema, values, false)
    }

    fn zip(schema: &TableSchema, values: Vec<SqlValue>, conform: bool) -> Result<Self> {
        if values.len() != schema.columns.len() {
            bail!(
                "row has {} values but the table has {} columns",
                values.len(),
                schema.columns.len()
            );
        }

        let cells = schema
            .columns
            .iter()
            .zip(values)
            .map(|(col, value)| {
                let value = if conform {
                    value.conform(&col.logical_type)
                } else {
                    value
                };
                (col.name.clone(), value)
            })
            .collect();
        Ok(Self { cells })
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.cells.iter().map(|(name, value)| (name.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders_schema() -> TableSchema {
        let mut id = ColumnDescriptor::new("id", LogicalType::BigInt);
        id.primary_key = true;
        id.nullable = false;
        let mut customer = ColumnDescriptor::new("customer_id", LogicalType::Integer);
        customer.foreign_key = Some(ForeignKeyRef {
            table: "customers".to_string(),
            column: "id".to_string(),
        });
        let placed = ColumnDescriptor::new("placed_at", LogicalType::Timestamp);
        TableSchema::new(Dialect::Postgres, vec![customer, id, placed])
    }

    #[test]
    fn test_ordering_column_prefers_primary_key() {
        let schema = orders_schema();
        assert_eq!(schema.ordering_column().unwrap().name, "id");
    }

    #[test]
    fn test_ordering_column_falls_back_to_first_column() {
        let schema = TableSchema::new(
            Dialect::Sqlite,
            vec![
                ColumnDescriptor::new("sku", LogicalType::Text),
                ColumnDescriptor::new("qty", LogicalType::Integer),
            ],
        );
        assert_eq!(schema.ordering_column().unwrap().name, "sku");

        let empty = TableSchema::new(Dialect::Sqlite, vec![]);
        assert!(empty.ordering_column().is_none());
    }

    #[test]
    fn test_key_order_follows_catalog() {
        let schema = TableSchema::new(
            Dialect::Mssql,
            vec![
                ColumnDescriptor::new("line", LogicalType::Integer),
                ColumnDescriptor::new("order_id", LogicalType::Integer),
                ColumnDescriptor::new("note", LogicalType::Text),
            ],
        )
        .with_primary_key(vec!["order_id".to_string(), "line".to_string()]);

        let key: Vec<&str> = schema
            .primary_key_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(key, vec!["order_id", "line"]);
        assert_eq!(schema.ordering_column().unwrap().name, "order_id");
        assert!(!schema.column("note").unwrap().primary_key);
    }

    #[test]
    fn test_without_foreign_keys_keeps_everything_else() {
        let schema = orders_schema();
        let stripped = schema.without_foreign_keys();
        assert!(stripped.columns.iter().all(|c| c.foreign_key.is_none()));
        assert_eq!(stripped.column_names(), schema.column_names());
        assert!(stripped.column("id").unwrap().primary_key);
        assert!(!stripped.column("id").unwrap().nullable);
    }

    #[test]
    fn test_batch_row_zips_by_column_name() {
        let schema = orders_schema();
        let row = BatchRow::from_tuple(
            &schema,
            vec![
                SqlValue::Int(7),
                SqlValue::Int(1),
                SqlValue::Text("2024-01-02 03:04:05".to_string()),
            ],
        )
        .unwrap();

        assert_eq!(row.len(), 3);
        assert_eq!(row.get("customer_id"), Some(&SqlValue::Int(7)));
        assert_eq!(row.get("id"), Some(&SqlValue::Int(1)));
        assert!(matches!(row.get("placed_at"), Some(SqlValue::Timestamp(_))));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_verbatim_row_keeps_decoded_values() {
        let schema = orders_schema();
        let placed = SqlValue::Text("2024-01-02 03:04:05".to_string());
        let row = BatchRow::verbatim(
            &schema,
            vec![SqlValue::Int(7), SqlValue::Int(1), placed.clone()],
        )
        .unwrap();
        assert_eq!(row.get("placed_at"), Some(&placed));
    }

    #[test]
    fn test_batch_row_rejects_width_mismatch() {
        let schema = orders_schema();
        let err = BatchRow::from_tuple(&schema, vec![SqlValue::Int(1)]).unwrap_err();
        assert!(err.to_string().contains("1 values"));
        assert!(err.to_string().contains("3 columns"));
    }
}
