//! Orchestration driver
//!
//! Builds one session from the configuration, synchronizes every configured
//! table in file order, then stops the session.

use std::fmt;

use crate::Result;
use crate::config::SyncConfig;
use crate::session::{
    SessionOptions, StorageCredentials, StorageProtocol, StorageSettings, build_session,
};
use crate::sync::{TableRegistry, TableSyncOutcome, TableSyncResult, sync_table};

/// Logical id the catalog connector is registered under
pub const CATALOG_CONNECTOR_ID: &str = "mydatacatalog";

/// Value of the `app.name` option
pub const APP_NAME: &str = "iceberg_catalog_sync";

/// Engine options derived from the configuration.
///
/// User `options` from the configuration are merged last and win.
pub fn engine_options(config: &SyncConfig) -> SessionOptions {
    let connector = |suffix: &str| format!("catalog.{CATALOG_CONNECTOR_ID}.{suffix}");

    let mut options = SessionOptions::new()
        .with("app.name", APP_NAME)
        .with("app.packages", config.packages.join(","))
        .with("datafusion.catalog.default_catalog", config.catalog_name.clone())
        .with("datafusion.catalog.information_schema", "true")
        // Statements may only reach catalogs declared through connectors
        .with("datafusion.catalog.create_default_catalog_and_schema", "false")
        .with(connector("catalog-impl"), config.catalog_impl.clone())
        .with(connector("uri"), config.catalog_uri.clone())
        .with(connector("warehouse"), config.warehouse_path())
        .with(connector("io-impl"), config.io_impl.clone());
    options.merge(&SessionOptions::from(config.options.clone()));
    options
}

/// Per-table results of one run, in configuration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub results: Vec<TableSyncResult>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn registered(&self) -> usize {
        self.count(|o| matches!(o, TableSyncOutcome::Registered { .. }))
    }

    pub fn already_registered(&self) -> usize {
        self.count(|o| matches!(o, TableSyncOutcome::AlreadyRegistered))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TableSyncOutcome::SkippedNoMetadata))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TableSyncOutcome::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &TableSyncResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, TableSyncOutcome::Failed { .. }))
    }

    fn count(&self, predicate: impl Fn(&TableSyncOutcome) -> bool) -> usize {
        self.results.iter().filter(|r| predicate(&r.outcome)).count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tables: {} registered, {} already registered, {} skipped, {} failed",
            self.total(),
            self.registered(),
            self.already_registered(),
            self.skipped(),
            self.failed()
        )
    }
}

/// Synchronize every configured table, strictly sequentially and in file order.
pub async fn sync_all(registry: &dyn TableRegistry, config: &SyncConfig) -> RunSummary {
    let mut results = Vec::with_capacity(config.table_count());
    for database in &config.databases {
        for table in &database.tables {
            results.push(sync_table(registry, &config.catalog_name, &database.name, table).await);
        }
    }
    RunSummary { results }
}

/// Run a full synchronization.
///
/// Fails only if the session cannot be built; per-table problems are reported
/// in the summary.
pub async fn run(config: &SyncConfig, credentials: StorageCredentials) -> Result<RunSummary> {
    let settings = StorageSettings::new(config.aws_region.clone(), credentials);
    let session = build_session(&settings, &engine_options(config), StorageProtocol::S3a).await?;

    let summary = sync_all(&session, config).await;
    session.stop().await;

    tracing::info!(%summary, "sync finished");
    Ok(summary)
}
