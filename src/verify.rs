// ABOUTME: Post-transfer row-count reconciliation and the run report
// ABOUTME: Mismatches become warnings in the report; verification never fails a run

use std::fmt;

use crate::reflect::SchemaReflector;
use crate::table_ref::TableReference;

/// Which algorithm a run used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMode {
    Migration,
    Sync,
}

impl fmt::Display for ReplicationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationMode::Migration => f.write_str("migration"),
            ReplicationMode::Sync => f.write_str("sync"),
        }
    }
}

/// Result of comparing final counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Counts satisfy the mode's success condition.
    Verified,
    /// Counts do not; `delta` is destination minus source.
    Mismatch { delta: i64 },
    /// Counts could not be read.
    Unavailable(String),
}

/// Summary of a migration or sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub mode: ReplicationMode,
    /// Source rows when the run started; the migration target.
    pub source_count: u64,
    pub destination_count_before: u64,
    pub start_offset: u64,
    pub rows_transferred: u64,
    pub batches: u64,
    pub table_created: bool,
    pub truncated: bool,
    pub final_source_count: Option<u64>,
    pub final_destination_count: Option<u64>,
    pub verification: Verification,
}

impl SyncReport {
    pub fn new(mode: ReplicationMode, source_count: u64, destination_count_before: u64) -> Self {
        Self {
            mode,
            source_count,
            destination_count_before,
            start_offset: 0,
            rows_transferred: 0,
            batches: 0,
            table_created: false,
            truncated: false,
            final_source_count: None,
            final_destination_count: None,
            verification: Verification::Unavailable("not verified".to_string()),
        }
    }

    pub fn is_verified(&self) -> bool {
        self.verification == Verification::Verified
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode: {}", self.mode)?;
        writeln!(f, "Source rows: {}", self.source_count)?;
        writeln!(
            f,
            "Destination rows before: {}",
            self.destination_count_before
        )?;
        if self.table_created {
            writeln!(f, "Destination table created")?;
        }
        if self.truncated {
            writeln!(f, "Destination table truncated")?;
        }
        writeln!(
            f,
            "Rows transferred: {} in {} batch(es) from offset {}",
            self.rows_transferred, self.batches, self.start_offset
        )?;
        if let (Some(source), Some(destination)) =
            (self.final_source_count, self.final_destination_count)
        {
            writeln!(f, "Final counts: source {}, destination {}", source, destination)?;
        }
        match &self.verification {
            Verification::Verified => write!(f, "✓ Verification passed"),
            Verification::Mismatch { delta } => {
                write!(f, "⚠ Verification mismatch: destination differs by {:+}", delta)
            }
            Verification::Unavailable(reason) => write!(f, "⚠ Verification skipped: {}", reason),
        }
    }
}

/// Judge final counts for `mode`.
///
/// Migration succeeds when the destination holds at least the rows the source
/// had when the run began; sync requires the final counts to be equal.
pub fn judge(mode: ReplicationMode, baseline_source: u64, source: u64, destination: u64) -> Verification {
    let ok = match mode {
        ReplicationMode::Migration => destination >= baseline_source,
        ReplicationMode::Sync => destination == source,
    };
    if ok {
        return Verification::Verified;
    }

    let reference = match mode {
        ReplicationMode::Migration => baseline_source,
        ReplicationMode::Sync => source,
    };
    Verification::Mismatch {
        delta: destination as i64 - reference as i64,
    }
}

/// Re-counts both tables after a transfer.
pub struct Verifier<'a> {
    source: SchemaReflector<'a>,
    destination: SchemaReflector<'a>,
    source_table: &'a TableReference,
    destination_table: &'a TableReference,
}

impl<'a> Verifier<'a> {
    pub fn new(
        source: SchemaReflector<'a>,
        destination: SchemaReflector<'a>,
        source_table: &'a TableReference,
        destination_table: &'a TableReference,
    ) -> Self {
        Self {
            source,
            destination,
            source_table,
            destination_table,
        }
    }

    /// Fill the final counts and verdict into `report`.
    pub async fn verify(&self, report: &mut SyncReport) {
        let counts = async {
            let source = self.source.count(self.source_table).await?;
            let destination = self.destination.count(self.destination_table).await?;
            Ok::<_, crate::error::ReplicatorError>((source, destination))
        }
        .await;

        match counts {
            Ok((source, destination)) => {
                report.final_source_count = Some(source);
                report.final_destination_count = Some(destination);
                report.verification = judge(report.mode, report.source_count, source, destination);
            }
            Err(e) => {
                tracing::warn!("Could not verify row counts: {}", e);
                report.verification = Verification::Unavailable(e.to_string());
                return;
            }
        }

        match &report.verification {
            Verification::Verified => tracing::info!(
                "✓ Verified: source {} rows, destination {} rows",
                report.final_source_count.unwrap_or_default(),
                report.final_destination_count.unwrap_or_default()
            ),
            Verification::Mismatch { delta } => tracing::warn!(
                "Row counts differ after {}: source {}, destination {} (delta {:+})",
                report.mode,
                report.final_source_count.unwrap_or_default(),
                report.final_destination_count.unwrap_or_default(),
                delta
            ),
            Verification::Unavailable(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_allows_destination_surplus() {
        assert_eq!(
            judge(ReplicationMode::Migration, 100, 100, 100),
            Verification::Verified
        );
        assert_eq!(
            judge(ReplicationMode::Migration, 100, 120, 150),
            Verification::Verified
        );
        assert_eq!(
            judge(ReplicationMode::Migration, 100, 100, 90),
            Verification::Mismatch { delta: -10 }
        );
    }

    #[test]
    fn test_sync_requires_equal_counts() {
        assert_eq!(judge(ReplicationMode::Sync, 100, 100, 100), Verification::Verified);
        assert_eq!(
            judge(ReplicationMode::Sync, 40, 40, 100),
            Verification::Mismatch { delta: 60 }
        );
    }

    #[test]
    fn test_report_summary_mentions_mismatch() {
        let mut report = SyncReport::new(ReplicationMode::Sync, 40, 100);
        report.final_source_count = Some(40);
        report.final_destination_count = Some(100);
        report.verification = Verification::Mismatch { delta: 60 };

        let text = report.to_string();
        assert!(text.contains("Mode: sync"));
        assert!(text.contains("+60"));
        assert!(!report.is_verified());
    }
}
