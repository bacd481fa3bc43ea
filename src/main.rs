use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use iceberg_catalog_sync::{StorageCredentials, SyncConfig, run};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "iceberg-sync")]
#[command(about = "Sync Iceberg tables on object storage into an Iceberg SQL catalog")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long)]
    config: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("iceberg_catalog_sync=info,iceberg_sync=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = SyncConfig::from_path(&args.config)
        .with_context(|| format!("Failed to load config {}", args.config.display()))?;

    let summary = run(&config, StorageCredentials::from_env())
        .await
        .context("Failed to build session")?;

    for failure in summary.failures() {
        tracing::warn!("{failure}");
    }
    Ok(())
}
