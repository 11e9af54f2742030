// ABOUTME: Incremental sync: append source rows beyond the destination's row count
// ABOUTME: Never truncates; a destination ahead of the source is reported, not repaired

use tokio_util::sync::CancellationToken;

use super::{prepare_destination, reflect_source, Endpoints};
use crate::config::ReplicationConfig;
use crate::error::Result;
use crate::progress;
use crate::reflect::SchemaReflector;
use crate::transfer::{BatchTransfer, SyncPlan};
use crate::verify::{ReplicationMode, SyncReport, Verifier};

/// Run an incremental sync.
///
/// The destination is assumed to hold a prefix of the source in ordering-key
/// order; rows from offset `destination count` onward are copied.
pub async fn sync(config: &ReplicationConfig, cancel: CancellationToken) -> Result<SyncReport> {
    let endpoints = Endpoints::open(config).await?;
    let result = run(&endpoints, config, cancel).await;
    endpoints.close();
    result
}

async fn run(
    endpoints: &Endpoints,
    config: &ReplicationConfig,
    cancel: CancellationToken,
) -> Result<SyncReport> {
    let options = &config.migration;
    if options.truncate_destination {
        tracing::warn!("truncate_destination is ignored in sync mode");
    }

    let source_reflector = SchemaReflector::new(&endpoints.source);
    let destination_reflector = SchemaReflector::new(&endpoints.destination);

    let source_schema = reflect_source(endpoints).await?;
    let created = prepare_destination(endpoints, &source_schema, options).await?;

    let source_count = source_reflector.count(&endpoints.source_table).await?;
    let destination_count = destination_reflector
        .count(&endpoints.destination_table)
        .await?;
    tracing::info!(
        "Source rows: {}, destination rows: {}",
        source_count,
        destination_count
    );

    let mut report = SyncReport::new(ReplicationMode::Sync, source_count, destination_count);
    report.table_created = created;

    let plan = SyncPlan::from_counts(source_count, destination_count);
    match plan {
        SyncPlan::Copy { start, end } => {
            tracing::info!("Sync plan: {}", plan);
            let destination_schema = destination_reflector
                .reflect(&endpoints.destination_table)
                .await?;
            let transfer = BatchTransfer::new(
                &endpoints.source,
                &endpoints.destination,
                &endpoints.source_table,
                &endpoints.destination_table,
                &source_schema,
                &destination_schema,
                options.batch_size,
            )?
            .with_cancellation(cancel);

            let reporter = progress::reporter(options.show_progress);
            let progress = transfer.copy_range(start, end, reporter.as_ref()).await?;
            report.start_offset = start;
            report.rows_transferred = progress.rows_copied;
            report.batches = progress.batches;
            tracing::info!(
                "✓ Synced {} rows from offset {}",
                progress.rows_copied,
                start
            );
        }
        SyncPlan::InSync => {
            report.start_offset = destination_count;
            tracing::info!("✓ Tables are already synchronized");
        }
        SyncPlan::DestinationAhead { excess } => {
            report.start_offset = destination_count;
            tracing::warn!(
                "Destination has {} more rows than the source; nothing was copied",
                excess
            );
        }
    }

    Verifier::new(
        source_reflector,
        destination_reflector,
        &endpoints.source_table,
        &endpoints.destination_table,
    )
    .verify(&mut report)
    .await;

    Ok(report)
}
