// ABOUTME: Full migration: copy every source row into the destination table
// ABOUTME: Optionally creates and truncates the destination first, then verifies counts

use tokio_util::sync::CancellationToken;

use super::{prepare_destination, reflect_source, Endpoints};
use crate::config::ReplicationConfig;
use crate::error::Result;
use crate::materialize::TableMaterializer;
use crate::progress;
use crate::reflect::SchemaReflector;
use crate::transfer::BatchTransfer;
use crate::verify::{ReplicationMode, SyncReport, Verifier};

/// Run a full migration.
///
/// Both connections are closed before returning, whether the run succeeded
/// or not.
pub async fn migrate(config: &ReplicationConfig, cancel: CancellationToken) -> Result<SyncReport> {
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
    let source_reflector = SchemaReflector::new(&endpoints.source);
    let destination_reflector = SchemaReflector::new(&endpoints.destination);

    let source_schema = reflect_source(endpoints).await?;
    let source_count = source_reflector.count(&endpoints.source_table).await?;
    tracing::info!("Source rows: {}", source_count);

    let created = prepare_destination(endpoints, &source_schema, options).await?;

    let truncated = if options.truncate_destination {
        TableMaterializer::new(&endpoints.destination)
            .truncate(&endpoints.destination_table)
            .await?;
        true
    } else {
        false
    };

    let destination_count = destination_reflector
        .count(&endpoints.destination_table)
        .await?;
    tracing::info!("Destination rows before migration: {}", destination_count);
    if destination_count > 0 && !options.truncate_destination {
        tracing::warn!(
            "Destination {} already holds {} rows and truncate_destination is false; rows will be appended",
            endpoints.destination_table,
            destination_count
        );
    }

    let mut report = SyncReport::new(ReplicationMode::Migration, source_count, destination_count);
    report.table_created = created;
    report.truncated = truncated;

    if source_count == 0 {
        tracing::info!("Source table is empty, nothing to migrate");
    } else {
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
        let progress = transfer
            .copy_range(0, source_count, reporter.as_ref())
            .await?;
        report.rows_transferred = progress.rows_copied;
        report.batches = progress.batches;
        tracing::info!(
            "✓ Migrated {} rows in {} batch(es)",
            progress.rows_copied,
            progress.batches
        );
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
