// ABOUTME: YAML run configuration: source and destination endpoints plus migration options
// ABOUTME: Loaded with serde_yaml and validated before any connection is attempted

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{ReplicatorError, Result};
use crate::table_ref::TableReference;

/// Root of `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicationConfig {
    pub source: EndpointConfig,
    pub destination: EndpointConfig,
    #[serde(default)]
    pub migration: MigrationOptions,
}

/// One side of a run: where the table lives and how to reach it.
#[derive(Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub db_type: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name; file path for SQLite, service name for Oracle.
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// `table` or `schema.table`.
    pub table: String,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default)]
    pub encrypt: bool,
    #[serde(default)]
    pub trust_server_certificate: bool,
}

fn default_connect_retries() -> u32 {
    2
}

impl EndpointConfig {
    /// Endpoint for a SQLite database file.
    pub fn sqlite(path: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            db_type: "sqlite".to_string(),
            host: None,
            port: None,
            database: path.into(),
            username: None,
            password: None,
            table: table.into(),
            connect_retries: 0,
            encrypt: false,
            trust_server_certificate: false,
        }
    }

    pub fn dialect(&self) -> Result<Dialect> {
        Dialect::parse(&self.db_type)
    }

    pub fn table_reference(&self) -> Result<TableReference> {
        TableReference::parse(&self.table)
    }

    fn validate(&self, side: &str) -> Result<()> {
        let dialect = self.dialect()?;
        self.table_reference()
            .map_err(|e| ReplicatorError::configuration(format!("{}: {}", side, e)))?;

        if self.database.trim().is_empty() {
            return Err(ReplicatorError::configuration(format!(
                "{}: database is required for {}",
                side, dialect
            )));
        }

        if !dialect.is_file_based() {
            let has_host = self.host.as_deref().is_some_and(|h| !h.trim().is_empty());
            if !has_host {
                return Err(ReplicatorError::configuration(format!(
                    "{}: host is required for {}",
                    side, dialect
                )));
            }
        }

        Ok(())
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("table", &self.table)
            .field("connect_retries", &self.connect_retries)
            .field("encrypt", &self.encrypt)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .finish()
    }
}

/// Behaviour of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationOptions {
    pub create_table_if_missing: bool,
    /// Migration only; sync never truncates.
    pub truncate_destination: bool,
    pub batch_size: u64,
    pub show_progress: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            create_table_if_missing: true,
            truncate_destination: false,
            batch_size: 1000,
            show_progress: true,
        }
    }
}

impl ReplicationConfig {
    /// Read, parse, and validate a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReplicatorError::configuration(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ReplicationConfig = serde_yaml::from_str(yaml).map_err(|e| {
            ReplicatorError::configuration(format!("malformed configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;

        if self.migration.batch_size == 0 {
            return Err(ReplicatorError::configuration(
                "migration.batch_size must be at least 1",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
source:
  db_type: postgresql
  host: localhost
  port: 5432
  database: app
  username: app
  password: secret
  table: public.orders
destination:
  db_type: sqlite
  database: /tmp/replica.db
  table: orders
migration:
  batch_size: 500
"#;

    #[test]
    fn test_load_applies_defaults() {
        let config = ReplicationConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.source.port, Some(5432));
        assert_eq!(config.source.connect_retries, 2);
        assert!(!config.source.encrypt);
        assert_eq!(config.destination.host, None);
        assert_eq!(config.migration.batch_size, 500);
        assert!(config.migration.create_table_if_missing);
        assert!(!config.migration.truncate_destination);
        assert!(config.migration.show_progress);
    }

    #[test]
    fn test_missing_migration_section_uses_defaults() {
        let yaml = SAMPLE.split("migration:").next().unwrap();
        let config = ReplicationConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.migration.batch_size, 1000);
    }

    #[test]
    fn test_unsupported_db_type_is_rejected() {
        let yaml = SAMPLE.replace("db_type: sqlite", "db_type: db2");
        let err = ReplicationConfig::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ReplicatorError::Configuration(_)));
        assert!(err.to_string().contains("db2"));
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let yaml = SAMPLE.replace("batch_size: 500", "batch_size: 0");
        let err = ReplicationConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_network_dialect_requires_host() {
        let yaml = SAMPLE.replace("  host: localhost\n", "");
        let err = ReplicationConfig::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("source: host is required"));
    }

    #[test]
    fn test_empty_qualifier_is_rejected() {
        let yaml = SAMPLE.replace("table: public.orders", "table: .orders");
        assert!(matches!(
            ReplicationConfig::from_yaml(&yaml),
            Err(ReplicatorError::Configuration(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_is_configuration_error() {
        assert!(matches!(
            ReplicationConfig::from_yaml("source: [unclosed"),
            Err(ReplicatorError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ReplicationConfig::from_yaml(SAMPLE).unwrap();
        let debug = format!("{:?}", config.source);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }
}
