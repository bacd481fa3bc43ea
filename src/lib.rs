//! # Iceberg Catalog Sync
//!
//! Registers existing Apache Iceberg tables stored on object storage into an
//! Iceberg SQL catalog, driven by a YAML file listing databases and tables.
//!
//! ## Overview
//!
//! For each configured table the sync:
//! - lists `<table>/metadata/` and picks the latest `*.metadata.json`
//! - creates the target namespace if needed
//! - registers the table against that metadata file unless it is already present
//!
//! Catalog statements are issued through a DataFusion session whose catalog
//! provider is backed by SQLite, PostgreSQL or an in-memory store.
//!
//! ## Example
//!
//! ```no_run
//! # async fn example() -> iceberg_catalog_sync::Result<()> {
//! use iceberg_catalog_sync::{StorageCredentials, SyncConfig, run};
//!
//! let config = SyncConfig::from_path("sync.yaml")?;
//! let summary = run(&config, StorageCredentials::from_env()).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod catalog_backend;
pub mod config;
pub mod data_store_provider;
pub mod driver;
pub mod error;
pub mod metadata_locator;
pub mod schema;
pub mod session;
pub mod sync;
pub mod table;
pub mod types;

// Catalog backends (feature-gated)
#[cfg(feature = "catalog-postgres")]
pub mod catalog_backend_postgres;
#[cfg(feature = "catalog-sqlite")]
pub mod catalog_backend_sqlite;

// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

// Re-export main types for convenience
pub use catalog::IcebergCatalogProvider;
pub use catalog_backend::{CatalogBackend, MemoryCatalogBackend};
pub use config::SyncConfig;
pub use driver::{RunSummary, run, sync_all};
pub use error::SyncError;
pub use metadata_locator::{MetadataLister, locate_latest_metadata};
pub use session::{SessionOptions, StorageCredentials, StorageProtocol, SyncSession, build_session};
pub use sync::{TableRegistry, TableSyncOutcome, sync_table};
pub use table::IcebergTable;

#[cfg(feature = "catalog-postgres")]
pub use catalog_backend_postgres::PostgresCatalogBackend;
#[cfg(feature = "catalog-sqlite")]
pub use catalog_backend_sqlite::SqliteCatalogBackend;
