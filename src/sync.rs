//! Table synchronizer
//!
//! Registers one configured table in the catalog unless it is already there.
//! Every failure is captured in the returned outcome so one bad table never
//! stops the batch.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::catalog::IcebergCatalogProvider;
use crate::config::TableConfig;
use crate::metadata_locator::{MetadataLister, locate_latest_metadata};
use crate::session::SyncSession;
use crate::table::ICEBERG_FILE_TYPE;
use crate::{Result, SyncError};

/// Catalog operations the synchronizer needs from the engine
#[async_trait]
pub trait TableRegistry: Send + Sync {
    /// Lister for the bucket holding `location`
    fn metadata_lister(&self, location: &str) -> Result<Arc<dyn MetadataLister>>;

    async fn create_namespace_if_not_exists(&self, catalog: &str, namespace: &str) -> Result<()>;

    async fn list_tables(&self, catalog: &str, namespace: &str) -> Result<Vec<String>>;

    async fn register_table(
        &self,
        catalog: &str,
        namespace: &str,
        table: &str,
        metadata_location: &str,
    ) -> Result<()>;
}

/// What happened to one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableSyncOutcome {
    /// Newly registered against `metadata_location`
    Registered { metadata_location: String },
    /// Already present in the namespace; left untouched
    AlreadyRegistered,
    /// No metadata file could be located
    SkippedNoMetadata,
    /// Namespace creation, existence check or registration failed
    Failed { reason: String },
}

/// Outcome for one configured table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSyncResult {
    pub database: String,
    pub table: String,
    pub outcome: TableSyncOutcome,
}

impl fmt::Display for TableSyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: ", self.database, self.table)?;
        match &self.outcome {
            TableSyncOutcome::Registered { metadata_location } => {
                write!(f, "registered ({metadata_location})")
            },
            TableSyncOutcome::AlreadyRegistered => write!(f, "already registered"),
            TableSyncOutcome::SkippedNoMetadata => write!(f, "skipped, no metadata"),
            TableSyncOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Register `table` in `catalog_name.database_name` unless it is already present.
pub async fn sync_table(
    registry: &dyn TableRegistry,
    catalog_name: &str,
    database_name: &str,
    table: &TableConfig,
) -> TableSyncResult {
    let outcome = sync_table_outcome(registry, catalog_name, database_name, table).await;
    TableSyncResult {
        database: database_name.to_string(),
        table: table.name.clone(),
        outcome,
    }
}

async fn sync_table_outcome(
    registry: &dyn TableRegistry,
    catalog_name: &str,
    database_name: &str,
    table: &TableConfig,
) -> TableSyncOutcome {
    let latest_metadata = match registry.metadata_lister(&table.location) {
        Ok(lister) => locate_latest_metadata(lister.as_ref(), &table.location).await,
        Err(e) => {
            tracing::warn!(location = %table.location, error = %e, "error accessing object storage");
            None
        },
    };

    let Some(metadata_location) = latest_metadata else {
        tracing::info!(
            database = database_name,
            table = %table.name,
            "skipping table due to missing metadata"
        );
        return TableSyncOutcome::SkippedNoMetadata;
    };

    match register_if_absent(
        registry,
        catalog_name,
        database_name,
        &table.name,
        &metadata_location,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::warn!(
                database = database_name,
                table = %table.name,
                error = %e,
                "error syncing table"
            );
            TableSyncOutcome::Failed {
                reason: e.to_string(),
            }
        },
    }
}

async fn register_if_absent(
    registry: &dyn TableRegistry,
    catalog_name: &str,
    database_name: &str,
    table_name: &str,
    metadata_location: &str,
) -> Result<TableSyncOutcome> {
    registry
        .create_namespace_if_not_exists(catalog_name, database_name)
        .await?;

    let existing = registry.list_tables(catalog_name, database_name).await?;
    if existing.iter().any(|name| name == table_name) {
        tracing::info!(
            database = database_name,
            table = table_name,
            "table already exists, skipping registration"
        );
        return Ok(TableSyncOutcome::AlreadyRegistered);
    }

    registry
        .register_table(catalog_name, database_name, table_name, metadata_location)
        .await?;
    tracing::info!(
        database = database_name,
        table = table_name,
        metadata = metadata_location,
        "successfully synced table"
    );
    Ok(TableSyncOutcome::Registered {
        metadata_location: metadata_location.to_string(),
    })
}

/// Quote an identifier for DataFusion SQL, preserving case.
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Quote a string literal for DataFusion SQL.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `CREATE SCHEMA IF NOT EXISTS "catalog"."namespace"`
pub fn create_namespace_statement(catalog: &str, namespace: &str) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {}.{}",
        quote_identifier(catalog),
        quote_identifier(namespace)
    )
}

/// `CREATE EXTERNAL TABLE "catalog"."namespace"."table" STORED AS ICEBERG LOCATION '<metadata>'`
pub fn register_table_statement(
    catalog: &str,
    namespace: &str,
    table: &str,
    metadata_location: &str,
) -> String {
    format!(
        "CREATE EXTERNAL TABLE {}.{}.{} STORED AS {} LOCATION {}",
        quote_identifier(catalog),
        quote_identifier(namespace),
        quote_identifier(table),
        ICEBERG_FILE_TYPE,
        quote_literal(metadata_location)
    )
}

#[async_trait]
impl TableRegistry for SyncSession {
    fn metadata_lister(&self, location: &str) -> Result<Arc<dyn MetadataLister>> {
        let store = self.object_store(location)?;
        let lister: Arc<dyn MetadataLister> = Arc::new(store);
        Ok(lister)
    }

    async fn create_namespace_if_not_exists(&self, catalog: &str, namespace: &str) -> Result<()> {
        self.sql(&create_namespace_statement(catalog, namespace))
            .await?;
        Ok(())
    }

    async fn list_tables(&self, catalog: &str, namespace: &str) -> Result<Vec<String>> {
        let provider = self
            .context()
            .catalog(catalog)
            .ok_or_else(|| SyncError::InvalidConfig(format!("Catalog not found: {catalog}")))?;

        // Iceberg catalogs report backend errors; others only expose infallible listing.
        if let Some(iceberg) = provider.as_any().downcast_ref::<IcebergCatalogProvider>() {
            return iceberg.backend().list_tables(namespace).await;
        }

        let schema = provider
            .schema(namespace)
            .ok_or_else(|| SyncError::NamespaceNotFound(format!("{catalog}.{namespace}")))?;
        Ok(schema.table_names())
    }

    async fn register_table(
        &self,
        catalog: &str,
        namespace: &str,
        table: &str,
        metadata_location: &str,
    ) -> Result<()> {
        self.sql(&register_table_statement(
            catalog,
            namespace,
            table,
            metadata_location,
        ))
        .await?;
        Ok(())
    }
}
