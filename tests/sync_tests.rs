//! Table synchronizer tests
//!
//! Drives `sync_table` / `sync_all` against a recording registry so the exact
//! sequence of catalog calls can be checked, including injected failures.
//!
//! ## Coverage
//!
//! - Missing metadata never reaches the catalog
//! - Latest metadata file selection
//! - Already registered tables are left untouched
//! - A failing table does not stop the batch
//! - Tables are attempted in configuration order
//! - Access denied on the bucket is treated as missing metadata

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use iceberg_catalog_sync::config::TableConfig;
use iceberg_catalog_sync::sync::TableSyncResult;
use iceberg_catalog_sync::{
    MetadataLister, Result, SyncError, TableRegistry, TableSyncOutcome, sync_all, sync_table,
};
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path;

use common::{BUCKET, CATALOG, memory_config, put, put_metadata, table_location};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    CreateNamespace(String),
    ListTables(String),
    Register {
        namespace: String,
        table: String,
        metadata_location: String,
    },
}

/// Lister that refuses every request
struct DeniedLister;

impl MetadataLister for DeniedLister {
    fn list_keys<'a>(&'a self, prefix: &'a Path) -> BoxStream<'a, Result<Path>> {
        futures::stream::once(async move {
            Err(SyncError::from(object_store::Error::PermissionDenied {
                path: prefix.to_string(),
                source: "Access Denied".into(),
            }))
        })
        .boxed()
    }
}

#[derive(Default)]
struct RecordingRegistry {
    store: Option<Arc<dyn ObjectStore>>,
    calls: Mutex<Vec<Call>>,
    tables: Mutex<BTreeMap<String, BTreeSet<String>>>,
    failing_listings: BTreeSet<String>,
    denied: bool,
}

impl RecordingRegistry {
    fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store: Some(store),
            ..Default::default()
        }
    }

    fn with_existing(self, namespace: &str, table: &str) -> Self {
        self.tables
            .lock()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .insert(table.to_string());
        self
    }

    fn with_failing_listing(mut self, namespace: &str) -> Self {
        self.failing_listings.insert(namespace.to_string());
        self
    }

    fn denied(mut self) -> Self {
        self.denied = true;
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn registrations(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Register {
                    namespace, table, ..
                } => Some((namespace, table)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TableRegistry for RecordingRegistry {
    fn metadata_lister(&self, _location: &str) -> Result<Arc<dyn MetadataLister>> {
        if self.denied {
            return Ok(Arc::new(DeniedLister));
        }
        let store = self
            .store
            .clone()
            .ok_or_else(|| SyncError::Internal("no store".to_string()))?;
        let lister: Arc<dyn MetadataLister> = Arc::new(store);
        Ok(lister)
    }

    async fn create_namespace_if_not_exists(&self, catalog: &str, namespace: &str) -> Result<()> {
        assert_eq!(catalog, CATALOG);
        self.calls
            .lock()
            .unwrap()
            .push(Call::CreateNamespace(namespace.to_string()));
        self.tables
            .lock()
            .unwrap()
            .entry(namespace.to_string())
            .or_default();
        Ok(())
    }

    async fn list_tables(&self, catalog: &str, namespace: &str) -> Result<Vec<String>> {
        assert_eq!(catalog, CATALOG);
        self.calls
            .lock()
            .unwrap()
            .push(Call::ListTables(namespace.to_string()));
        if self.failing_listings.contains(namespace) {
            return Err(SyncError::Internal("catalog unavailable".to_string()));
        }
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(namespace)
            .map(|t| t.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn register_table(
        &self,
        catalog: &str,
        namespace: &str,
        table: &str,
        metadata_location: &str,
    ) -> Result<()> {
        assert_eq!(catalog, CATALOG);
        self.calls.lock().unwrap().push(Call::Register {
            namespace: namespace.to_string(),
            table: table.to_string(),
            metadata_location: metadata_location.to_string(),
        });
        let mut tables = self.tables.lock().unwrap();
        let inserted = tables
            .entry(namespace.to_string())
            .or_default()
            .insert(table.to_string());
        if !inserted {
            return Err(SyncError::TableAlreadyExists(format!("{namespace}.{table}")));
        }
        Ok(())
    }
}

fn table(database: &str, name: &str) -> TableConfig {
    TableConfig {
        name: name.to_string(),
        location: table_location(database, name),
    }
}

fn memory_store() -> Arc<dyn ObjectStore> {
    Arc::new(InMemory::new())
}

#[tokio::test]
async fn test_missing_metadata_makes_no_catalog_calls() {
    let store = memory_store();
    // Data files only, no metadata directory
    put(
        store.as_ref(),
        "warehouse/db1/tbl1/data/00000-0-data.parquet",
        "PAR1",
    )
    .await;
    let registry = RecordingRegistry::new(store);

    let result = sync_table(&registry, CATALOG, "db1", &table("db1", "tbl1")).await;

    assert_eq!(result.outcome, TableSyncOutcome::SkippedNoMetadata);
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn test_registers_latest_metadata_file() {
    let store = memory_store();
    put_metadata(store.as_ref(), "db1", "tbl1", "00000-abc.metadata.json").await;
    put_metadata(store.as_ref(), "db1", "tbl1", "00001-def.metadata.json").await;
    put(
        store.as_ref(),
        "warehouse/db1/tbl1/metadata/snap-1-1-manifest-list.avro",
        "avro",
    )
    .await;
    let registry = RecordingRegistry::new(store);

    let result = sync_table(&registry, CATALOG, "db1", &table("db1", "tbl1")).await;

    let expected = format!("s3://{BUCKET}/warehouse/db1/tbl1/metadata/00001-def.metadata.json");
    assert_eq!(
        result.outcome,
        TableSyncOutcome::Registered {
            metadata_location: expected.clone()
        }
    );
    assert_eq!(
        registry.calls(),
        vec![
            Call::CreateNamespace("db1".to_string()),
            Call::ListTables("db1".to_string()),
            Call::Register {
                namespace: "db1".to_string(),
                table: "tbl1".to_string(),
                metadata_location: expected,
            },
        ]
    );
}

#[tokio::test]
async fn test_existing_table_is_not_registered_again() {
    let store = memory_store();
    put_metadata(store.as_ref(), "db1", "tbl1", "00000-abc.metadata.json").await;
    let registry = RecordingRegistry::new(store).with_existing("db1", "tbl1");

    let result = sync_table(&registry, CATALOG, "db1", &table("db1", "tbl1")).await;

    assert_eq!(result.outcome, TableSyncOutcome::AlreadyRegistered);
    assert!(registry.registrations().is_empty());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let store = memory_store();
    put_metadata(store.as_ref(), "db1", "tbl1", "00000-abc.metadata.json").await;
    put_metadata(store.as_ref(), "db1", "tbl2", "00003-xyz.metadata.json").await;
    let registry = RecordingRegistry::new(store);
    let config = memory_config(&[("db1", &["tbl1", "tbl2"])]);

    let first = sync_all(&registry, &config).await;
    let second = sync_all(&registry, &config).await;

    assert_eq!(first.registered(), 2);
    assert_eq!(second.registered(), 0);
    assert_eq!(second.already_registered(), 2);
    assert_eq!(
        registry.registrations(),
        vec![
            ("db1".to_string(), "tbl1".to_string()),
            ("db1".to_string(), "tbl2".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_failed_existence_check_does_not_stop_batch() {
    let store = memory_store();
    put_metadata(store.as_ref(), "db1", "tbl1", "00000-abc.metadata.json").await;
    put_metadata(store.as_ref(), "db2", "tbl2", "00000-abc.metadata.json").await;
    let registry = RecordingRegistry::new(store).with_failing_listing("db1");
    let config = memory_config(&[("db1", &["tbl1"]), ("db2", &["tbl2"])]);

    let summary = sync_all(&registry, &config).await;

    assert_eq!(summary.total(), 2);
    assert_eq!(summary.failed(), 1);
    assert_eq!(summary.registered(), 1);
    assert!(matches!(
        &summary.results[0].outcome,
        TableSyncOutcome::Failed { reason } if reason.contains("catalog unavailable")
    ));
    assert_eq!(
        registry.registrations(),
        vec![("db2".to_string(), "tbl2".to_string())]
    );
}

#[tokio::test]
async fn test_tables_attempted_in_file_order() {
    let store = memory_store();
    put_metadata(store.as_ref(), "sales", "orders", "00000-a.metadata.json").await;
    put_metadata(store.as_ref(), "sales", "customers", "00000-b.metadata.json").await;
    put_metadata(store.as_ref(), "ops", "events", "00000-c.metadata.json").await;
    let registry = RecordingRegistry::new(store);
    let config = memory_config(&[
        ("sales", &["orders", "refunds", "customers"]),
        ("ops", &["events"]),
    ]);

    let summary = sync_all(&registry, &config).await;

    let attempted: Vec<_> = summary
        .results
        .iter()
        .map(|TableSyncResult { database, table, .. }| format!("{database}.{table}"))
        .collect();
    assert_eq!(
        attempted,
        vec![
            "sales.orders",
            "sales.refunds",
            "sales.customers",
            "ops.events"
        ]
    );
    assert_eq!(summary.skipped(), 1);
    assert_eq!(
        registry.registrations(),
        vec![
            ("sales".to_string(), "orders".to_string()),
            ("sales".to_string(), "customers".to_string()),
            ("ops".to_string(), "events".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_access_denied_is_skipped() {
    let registry = RecordingRegistry::new(memory_store()).denied();

    let result = sync_table(&registry, CATALOG, "db1", &table("db1", "tbl1")).await;

    assert_eq!(result.outcome, TableSyncOutcome::SkippedNoMetadata);
    assert!(registry.calls().is_empty());
}

#[tokio::test]
async fn test_metadata_of_sibling_table_is_ignored() {
    let store = memory_store();
    put_metadata(store.as_ref(), "db1", "tbl10", "00000-abc.metadata.json").await;
    let registry = RecordingRegistry::new(store);

    let result = sync_table(&registry, CATALOG, "db1", &table("db1", "tbl1")).await;

    assert_eq!(result.outcome, TableSyncOutcome::SkippedNoMetadata);
    assert!(registry.calls().is_empty());
}
