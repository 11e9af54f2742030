// ABOUTME: Library entry point for table-replicator
// ABOUTME: Batch table replication between MySQL, PostgreSQL, SQL Server, Oracle, and SQLite

pub mod commands;
pub mod config;
pub mod connection;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod materialize;
pub mod progress;
pub mod reflect;
pub mod schema;
pub mod table_ref;
pub mod transfer;
pub mod utils;
pub mod value;
pub mod verify;

pub use config::{EndpointConfig, MigrationOptions, ReplicationConfig};
pub use connection::{ConnectionHandle, ConnectionProvider};
pub use dialect::{Dialect, SqlDialect};
pub use error::{ReplicatorError, Result};
pub use schema::{BatchRow, ColumnDescriptor, LogicalType, TableSchema};
pub use table_ref::TableReference;
pub use transfer::{BatchTransfer, SyncPlan, TransferProgress};
pub use value::SqlValue;
pub use verify::{ReplicationMode, SyncReport, Verification};
