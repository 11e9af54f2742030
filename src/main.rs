// ABOUTME: CLI entry point for table-replicator
// ABOUTME: Parses commands, loads the YAML config, and routes to migrate or sync

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use table_replicator::commands;
use table_replicator::config::ReplicationConfig;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "table-replicator")]
#[command(about = "Replicate a table between MySQL, PostgreSQL, SQL Server, Oracle, and SQLite", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short = 'c', long, global = true, default_value = "config.yaml")]
    config: PathBuf,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every source row into the destination table
    Migrate,
    /// Copy only the source rows beyond the destination's row count
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = ReplicationConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batch...");
            on_interrupt.cancel();
        }
    });

    let report = match cli.command {
        Commands::Migrate => commands::migrate(&config, cancel).await,
        Commands::Sync => commands::sync(&config, cancel).await,
    }?;

    println!();
    println!("{}", report);
    Ok(())
}
