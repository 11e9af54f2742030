// ABOUTME: Batch transfer engine: ordered, paginated copy of a row range between endpoints
// ABOUTME: Each batch is read fully, then written in one destination transaction

use std::fmt;

use anyhow::{anyhow, Context};
use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionHandle;
use crate::dialect::Statement;
use crate::drivers::Rows;
use crate::error::{ReplicatorError, Result};
use crate::progress::ProgressReporter;
use crate::schema::{BatchRow, ColumnDescriptor, TableSchema};
use crate::table_ref::TableReference;
use crate::value::SqlValue;

/// Offsets and counters of one transfer. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub start_offset: u64,
    pub current_offset: u64,
    pub end: u64,
    pub rows_copied: u64,
    pub batches: u64,
}

impl TransferProgress {
    pub fn new(start: u64, end: u64) -> Self {
        Self {
            start_offset: start,
            current_offset: start,
            end,
            rows_copied: 0,
            batches: 0,
        }
    }

    fn advance(&mut self, rows: u64) {
        self.current_offset += rows;
        self.rows_copied += rows;
        self.batches += 1;
    }

    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.current_offset)
    }
}

/// What an incremental sync should do given both row counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPlan {
    /// Copy source rows `[start, end)`.
    Copy { start: u64, end: u64 },
    /// Counts match; nothing to copy.
    InSync,
    /// The destination holds more rows than the source. Nothing is copied or
    /// removed.
    DestinationAhead { excess: u64 },
}

impl SyncPlan {
    pub fn from_counts(source: u64, destination: u64) -> Self {
        match source.cmp(&destination) {
            std::cmp::Ordering::Greater => SyncPlan::Copy {
                start: destination,
                end: source,
            },
            std::cmp::Ordering::Equal => SyncPlan::InSync,
            std::cmp::Ordering::Less => SyncPlan::DestinationAhead {
                excess: destination - source,
            },
        }
    }
}

impl fmt::Display for SyncPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPlan::Copy { start, end } => {
                write!(f, "copy {} rows from offset {}", end - start, start)
            }
            SyncPlan::InSync => f.write_str("already synchronized"),
            SyncPlan::DestinationAhead { excess } => {
                write!(f, "destination ahead of source by {} rows", excess)
            }
        }
    }
}

/// Copies rows of one source table into one destination table.
pub struct BatchTransfer<'a> {
    source: &'a ConnectionHandle,
    destination: &'a ConnectionHandle,
    source_table: &'a TableReference,
    destination_table: &'a TableReference,
    source_schema: &'a TableSchema,
    /// Destination column for each source column, in source order.
    destination_columns: Vec<ColumnDescriptor>,
    order_by: String,
    batch_size: u64,
    /// Values only change representation when crossing engines.
    conform: bool,
    cancel: CancellationToken,
}

impl<'a> BatchTransfer<'a> {
    /// Pair every source column with its destination column by name.
    ///
    /// Exact matches win; otherwise a unique case-insensitive match is used.
    /// A source column with no counterpart is a schema error.
    pub fn new(
        source: &'a ConnectionHandle,
        destination: &'a ConnectionHandle,
        source_table: &'a TableReference,
        destination_table: &'a TableReference,
        source_schema: &'a TableSchema,
        destination_schema: &TableSchema,
        batch_size: u64,
    ) -> Result<Self> {
        let order_by = source_schema
            .ordering_column()
            .map(|c| c.name.clone())
            .ok_or_else(|| ReplicatorError::schema(source_table, anyhow!("table has no columns")))?;

        let destination_columns = map_columns(source_schema, destination_schema)
            .map_err(|e| ReplicatorError::schema(destination_table, e))?;

        Ok(Self {
            source,
            destination,
            source_table,
            destination_table,
            source_schema,
            destination_columns,
            order_by,
            batch_size: batch_size.max(1),
            conform: source.dialect() != destination.dialect(),
            cancel: CancellationToken::new(),
        })
    }

    /// Stop at the next batch boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn order_by(&self) -> &str {
        &self.order_by
    }

    /// One ordered page of source rows starting at `offset`.
    pub async fn fetch_page(&self, offset: u64, limit: u64) -> anyhow::Result<Rows> {
        let sql = self.source.sql().page_query(
            self.source_table,
            &self.source_schema.columns,
            &self.order_by,
            offset,
            limit,
        );
        self.source
            .query(&Statement::plain(sql))
            .await
            .with_context(|| format!("failed to read rows at offset {}", offset))
    }

    /// Copy source rows `[start, end)` in batches of at most `batch_size`.
    ///
    /// Every batch is committed in its own destination transaction before the
    /// next is read. On failure or cancellation the error carries the number
    /// of rows already committed.
    pub async fn copy_range(
        &self,
        start: u64,
        end: u64,
        reporter: &dyn ProgressReporter,
    ) -> Result<TransferProgress> {
        let mut progress = TransferProgress::new(start, end);
        if start >= end {
            return Ok(progress);
        }

        tracing::info!(
            "Copying rows {}..{} of {} into {} (batch size {}, ordered by {})",
            start,
            end,
            self.source_table,
            self.destination_table,
            self.batch_size,
            self.order_by
        );
        reporter.start(end - start);
        let result = self.run(&mut progress, reporter).await;
        reporter.finish();
        result.map(|_| progress)
    }

    async fn run(
        &self,
        progress: &mut TransferProgress,
        reporter: &dyn ProgressReporter,
    ) -> Result<()> {
        let identity = self.destination_columns.iter().any(|c| c.autoincrement);

        while progress.current_offset < progress.end {
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    "Transfer cancelled after {} rows",
                    progress.rows_copied
                );
                return Err(ReplicatorError::Interrupted {
                    table: self.destination_table.to_string(),
                    rows_copied: progress.rows_copied,
                });
            }

            let limit = self.batch_size.min(progress.remaining());
            let rows = self
                .fetch_page(progress.current_offset, limit)
                .await
                .map_err(|e| self.transfer_error(progress, e))?;
            if rows.is_empty() {
                tracing::warn!(
                    "Source returned no rows at offset {} (expected {} more); stopping",
                    progress.current_offset,
                    progress.remaining()
                );
                break;
            }

            let fetched = rows.len() as u64;
            let values = self
                .destination_values(rows)
                .map_err(|e| self.transfer_error(progress, e))?;
            let statements = self.destination.sql().insert_statements(
                self.destination_table,
                &self.destination_columns,
                &values,
                identity,
            );
            self.destination
                .execute_atomic(&statements)
                .await
                .with_context(|| {
                    format!(
                        "failed to write batch at offset {}",
                        progress.current_offset
                    )
                })
                .map_err(|e| self.transfer_error(progress, e))?;

            progress.advance(fetched);
            reporter.report(fetched);
            tracing::debug!(
                "Batch {}: {} rows committed ({}/{})",
                progress.batches,
                fetched,
                progress.current_offset,
                progress.end
            );
        }

        Ok(())
    }

    /// Zip fetched tuples with the source schema and lay the values out in
    /// destination column order. Between identical engines the decoded values
    /// are written back untouched.
    fn destination_values(&self, rows: Rows) -> anyhow::Result<Vec<Vec<SqlValue>>> {
        rows.into_iter()
            .map(|tuple| {
                if !self.conform {
                    let row = BatchRow::verbatim(self.source_schema, tuple)?;
                    return Ok(row.iter().map(|(_, value)| value.clone()).collect());
                }
                let row = BatchRow::from_tuple(self.source_schema, tuple)?;
                Ok(row
                    .iter()
                    .zip(&self.destination_columns)
                    .map(|((_, value), column)| value.clone().conform(&column.logical_type))
                    .collect())
            })
            .collect()
    }

    fn transfer_error(&self, progress: &TransferProgress, source: anyhow::Error) -> ReplicatorError {
        ReplicatorError::Transfer {
            table: self.destination_table.to_string(),
            rows_copied: progress.rows_copied,
            source,
        }
    }
}

fn map_columns(
    source: &TableSchema,
    destination: &TableSchema,
) -> anyhow::Result<Vec<ColumnDescriptor>> {
    let mut missing = Vec::new();
    let mut mapped = Vec::with_capacity(source.columns.len());

    for column in &source.columns {
        let exact = destination.column(&column.name);
        let folded = || {
            let mut candidates = destination
                .columns
                .iter()
                .filter(|d| d.name.eq_ignore_ascii_case(&column.name));
            match (candidates.next(), candidates.next()) {
                (Some(only), None) => Some(only),
                _ => None,
            }
        };
        match exact.or_else(folded) {
            Some(d) => mapped.push(d.clone()),
            None => missing.push(column.name.clone()),
        }
    }

    if !missing.is_empty() {
        anyhow::bail!(
            "destination is missing source column(s): {}",
            missing.join(", ")
        );
    }
    Ok(mapped)
}
