// ABOUTME: Command implementations for full migration and incremental sync
// ABOUTME: Shares endpoint setup and destination preparation between both modes

pub mod migrate;
pub mod sync;

pub use migrate::migrate;
pub use sync::sync;

use anyhow::anyhow;

use crate::config::{MigrationOptions, ReplicationConfig};
use crate::connection::{ConnectionHandle, ConnectionProvider};
use crate::error::{ReplicatorError, Result};
use crate::materialize::TableMaterializer;
use crate::reflect::SchemaReflector;
use crate::schema::TableSchema;
use crate::table_ref::TableReference;

/// Both connections of a run plus their table references.
pub(crate) struct Endpoints {
    pub source: ConnectionHandle,
    pub destination: ConnectionHandle,
    pub source_table: TableReference,
    pub destination_table: TableReference,
}

impl Endpoints {
    /// Validate the configuration, then open and verify both endpoints.
    pub async fn open(config: &ReplicationConfig) -> Result<Self> {
        config.validate()?;
        let source_table = config.source.table_reference()?;
        let destination_table = config.destination.table_reference()?;

        let source = ConnectionProvider::open(&config.source).await?;
        let destination = match ConnectionProvider::open(&config.destination).await {
            Ok(conn) => conn,
            Err(e) => {
                source.close();
                return Err(e);
            }
        };

        tracing::info!("Source: {} table {}", source.label(), source_table);
        tracing::info!(
            "Destination: {} table {}",
            destination.label(),
            destination_table
        );

        Ok(Self {
            source,
            destination,
            source_table,
            destination_table,
        })
    }

    pub fn close(&self) {
        self.source.close();
        self.destination.close();
    }
}

/// Reflect the source table, failing when it does not exist.
pub(crate) async fn reflect_source(endpoints: &Endpoints) -> Result<TableSchema> {
    let schema = SchemaReflector::new(&endpoints.source)
        .reflect(&endpoints.source_table)
        .await?;
    tracing::info!(
        "✓ Source table {} has {} column(s)",
        endpoints.source_table,
        schema.columns.len()
    );
    Ok(schema)
}

/// Create the destination table when allowed and missing.
///
/// Returns whether it was created. A missing table that may not be created
/// is a schema error.
pub(crate) async fn prepare_destination(
    endpoints: &Endpoints,
    source_schema: &TableSchema,
    options: &MigrationOptions,
) -> Result<bool> {
    if options.create_table_if_missing {
        return TableMaterializer::new(&endpoints.destination)
            .ensure(&endpoints.destination_table, source_schema)
            .await;
    }

    let exists = SchemaReflector::new(&endpoints.destination)
        .exists(&endpoints.destination_table)
        .await?;
    if !exists {
        return Err(ReplicatorError::schema(
            &endpoints.destination_table,
            anyhow!("table does not exist and create_table_if_missing is disabled"),
        ));
    }
    tracing::info!(
        "✓ Destination table {} already exists",
        endpoints.destination_table
    );
    Ok(false)
}
