// ABOUTME: Error taxonomy for replication runs
// ABOUTME: Distinguishes configuration, connection, schema, and transfer failures

use thiserror::Error;

/// Errors surfaced by a replication run.
///
/// Driver-level failures are carried as `anyhow::Error` so the full context
/// chain survives; the variant says which stage of the run failed.
#[derive(Debug, Error)]
pub enum ReplicatorError {
    /// Bad or unsupported configuration. Raised before any connection attempt.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Connecting to an endpoint or its liveness check failed.
    #[error("failed to connect to {endpoint}: {source:#}")]
    Connection {
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    /// Reflecting, validating, creating, or truncating a table failed.
    #[error("schema error on table {table}: {source:#}")]
    Schema {
        table: String,
        #[source]
        source: anyhow::Error,
    },

    /// A batch read or write failed. Batches before the failure are committed.
    #[error("transfer into {table} failed after {rows_copied} rows: {source:#}")]
    Transfer {
        table: String,
        rows_copied: u64,
        #[source]
        source: anyhow::Error,
    },

    /// The run was cancelled at a batch boundary.
    #[error("transfer into {table} interrupted after {rows_copied} rows")]
    Interrupted { table: String, rows_copied: u64 },
}

impl ReplicatorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn connection(endpoint: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            source,
        }
    }

    pub fn schema(table: impl ToString, source: anyhow::Error) -> Self {
        Self::Schema {
            table: table.to_string(),
            source,
        }
    }

    /// Rows committed to the destination before the run stopped, if the
    /// failure happened during the transfer phase.
    pub fn rows_copied(&self) -> Option<u64> {
        match self {
            Self::Transfer { rows_copied, .. } | Self::Interrupted { rows_copied, .. } => {
                Some(*rows_copied)
            }
            _ => None,
        }
    }
}

pub type Result<T, E = ReplicatorError> = std::result::Result<T, E>;
