// ABOUTME: TableReference value type for optionally schema-qualified table names
// ABOUTME: Parsed once from configuration and passed to every catalog lookup

use std::fmt;

use crate::error::{ReplicatorError, Result};

/// A table name with an optional schema qualifier.
///
/// The qualifier is present iff the configured name contained a `.`.
/// Catalog lookups use it when present and fall back to the connection's
/// current schema when absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    schema: Option<String>,
    name: String,
}

impl TableReference {
    /// Parse `table` or `schema.table`. Splits at the first `.`.
    ///
    /// # Examples
    ///
    /// ```
    /// use table_replicator::TableReference;
    ///
    /// let t = TableReference::parse("sales.orders").unwrap();
    /// assert_eq!(t.schema(), Some("sales"));
    /// assert_eq!(t.name(), "orders");
    ///
    /// let t = TableReference::parse("orders").unwrap();
    /// assert_eq!(t.schema(), None);
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ReplicatorError::configuration("table name cannot be empty"));
        }

        match raw.split_once('.') {
            Some((schema, name)) => {
                let (schema, name) = (schema.trim(), name.trim());
                if schema.is_empty() || name.is_empty() {
                    return Err(ReplicatorError::configuration(format!(
                        "invalid qualified table name '{}': expected schema.table",
                        raw
                    )));
                }
                Ok(Self::qualified(schema, name))
            }
            None => Ok(Self::unqualified(raw)),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    pub fn unqualified(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}
