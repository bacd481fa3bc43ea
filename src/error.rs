//! Error types for the Iceberg catalog sync

use thiserror::Error;

/// Error type for catalog sync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Error from DataFusion
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from the object store client
    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// sqlx database error (for the SQLite/PostgreSQL catalog backends)
    #[cfg(any(feature = "catalog-sqlite", feature = "catalog-postgres"))]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Malformed YAML configuration
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Malformed Iceberg table metadata
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unparseable storage location
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Malformed or incomplete Iceberg table metadata
    #[error("Invalid table metadata: {0}")]
    InvalidMetadata(String),

    /// Namespace does not exist in the catalog
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    /// Table identifier is already registered
    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unsupported Iceberg type
    #[error("Unsupported Iceberg type: {0}")]
    UnsupportedType(String),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SyncError> for datafusion::error::DataFusionError {
    fn from(err: SyncError) -> Self {
        match err {
            // If it's already a DataFusion error, unwrap it
            SyncError::DataFusion(e) => e,
            other => datafusion::error::DataFusionError::External(Box::new(other)),
        }
    }
}
