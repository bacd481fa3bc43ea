//! Catalog backend trait and common types.
//!
//! A backend stores the catalog's namespaces and the metadata location each
//! registered table points at, following the Iceberg SQL catalog model.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::session::SessionOptions;
use crate::{Result, SyncError};

/// Namespace property marking an explicitly created namespace.
pub const NAMESPACE_EXISTS_PROPERTY: &str = "exists";
/// Namespace property holding the default location for new tables.
pub const NAMESPACE_LOCATION_PROPERTY: &str = "location";

/// Catalog storage operations used by the DataFusion catalog provider
#[async_trait]
pub trait CatalogBackend: Send + Sync + Debug {
    /// Name the backend scopes its rows by
    fn catalog_name(&self) -> &str;

    async fn list_namespaces(&self) -> Result<Vec<String>>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    /// Create a namespace. Returns `false` if it already existed.
    async fn create_namespace(&self, namespace: &str) -> Result<bool>;

    async fn namespace_properties(&self, namespace: &str) -> Result<BTreeMap<String, String>>;

    /// Table names in `namespace`, sorted. Errors if the namespace is missing.
    async fn list_tables(&self, namespace: &str) -> Result<Vec<String>>;

    /// Metadata location of a registered table
    async fn load_table(&self, namespace: &str, table: &str) -> Result<Option<String>>;

    /// Bind `namespace.table` to an existing metadata file.
    async fn register_table(
        &self,
        namespace: &str,
        table: &str,
        metadata_location: &str,
    ) -> Result<()>;

    /// Release connections held by the backend.
    async fn close(&self) {}
}

/// Default namespace location under a warehouse root (`{warehouse}/{namespace}.db`).
pub fn namespace_location(warehouse: &str, namespace: &str) -> String {
    format!("{}/{}.db", warehouse.trim_end_matches('/'), namespace)
}

/// Properties written when a namespace is created.
pub(crate) fn initial_namespace_properties(
    warehouse: Option<&str>,
    namespace: &str,
) -> Vec<(&'static str, String)> {
    let mut properties = vec![(NAMESPACE_EXISTS_PROPERTY, "true".to_string())];
    if let Some(warehouse) = warehouse {
        properties.push((
            NAMESPACE_LOCATION_PROPERTY,
            namespace_location(warehouse, namespace),
        ));
    }
    properties
}

/// Catalog connector settings read from `catalog.<id>.*` session options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConnector {
    pub id: String,
    /// `sql` or `memory`
    pub catalog_impl: String,
    /// Connection string for `sql` catalogs
    pub uri: Option<String>,
    /// Root location for namespaces created by the catalog
    pub warehouse: Option<String>,
    /// Object store implementation used to read table metadata
    pub io_impl: String,
}

impl CatalogConnector {
    pub fn from_options(id: &str, options: &SessionOptions) -> Result<Self> {
        let key = |suffix: &str| format!("catalog.{id}.{suffix}");
        let catalog_impl = options.get(&key("catalog-impl")).ok_or_else(|| {
            SyncError::InvalidConfig(format!("Catalog '{id}' has no catalog-impl"))
        })?;

        Ok(Self {
            id: id.to_string(),
            catalog_impl: catalog_impl.to_string(),
            uri: options.get(&key("uri")).map(str::to_string),
            warehouse: options.get(&key("warehouse")).map(str::to_string),
            io_impl: options
                .get(&key("io-impl"))
                .unwrap_or("s3")
                .to_string(),
        })
    }

    /// Open the backend this connector describes.
    pub async fn connect(&self) -> Result<Arc<dyn CatalogBackend>> {
        match self.catalog_impl.as_str() {
            "memory" => Ok(Arc::new(MemoryCatalogBackend::new(
                &self.id,
                self.warehouse.clone(),
            ))),
            "sql" => {
                let uri = self.uri.as_deref().ok_or_else(|| {
                    SyncError::InvalidConfig(format!("SQL catalog '{}' has no uri", self.id))
                })?;
                self.connect_sql(uri).await
            },
            other => Err(SyncError::Unsupported(format!(
                "Unsupported catalog implementation: {other}. Supported: sql, memory"
            ))),
        }
    }

    async fn connect_sql(&self, uri: &str) -> Result<Arc<dyn CatalogBackend>> {
        #[cfg(feature = "catalog-sqlite")]
        if uri.starts_with("sqlite:") {
            let backend = crate::catalog_backend_sqlite::SqliteCatalogBackend::new_with_init(
                uri,
                &self.id,
                self.warehouse.clone(),
            )
            .await?;
            return Ok(Arc::new(backend));
        }

        #[cfg(feature = "catalog-postgres")]
        if uri.starts_with("postgres://") || uri.starts_with("postgresql://") {
            let backend = crate::catalog_backend_postgres::PostgresCatalogBackend::new_with_init(
                uri,
                &self.id,
                self.warehouse.clone(),
            )
            .await?;
            return Ok(Arc::new(backend));
        }

        Err(SyncError::Unsupported(format!(
            "No SQL catalog backend enabled for '{uri}'"
        )))
    }
}

#[derive(Debug, Default)]
struct MemoryNamespace {
    properties: BTreeMap<String, String>,
    tables: BTreeMap<String, String>,
}

/// In-process catalog backend
///
/// Nothing is persisted; registrations live as long as the backend.
#[derive(Debug)]
pub struct MemoryCatalogBackend {
    catalog_name: String,
    warehouse: Option<String>,
    namespaces: RwLock<BTreeMap<String, MemoryNamespace>>,
}

impl MemoryCatalogBackend {
    pub fn new(catalog_name: impl Into<String>, warehouse: Option<String>) -> Self {
        Self {
            catalog_name: catalog_name.into(),
            warehouse,
            namespaces: RwLock::new(BTreeMap::new()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&BTreeMap<String, MemoryNamespace>) -> T) -> Result<T> {
        let guard = self
            .namespaces
            .read()
            .map_err(|_| SyncError::Internal("memory catalog lock poisoned".to_string()))?;
        Ok(f(&guard))
    }

    fn write<T>(&self, f: impl FnOnce(&mut BTreeMap<String, MemoryNamespace>) -> T) -> Result<T> {
        let mut guard = self
            .namespaces
            .write()
            .map_err(|_| SyncError::Internal("memory catalog lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

#[async_trait]
impl CatalogBackend for MemoryCatalogBackend {
    fn catalog_name(&self) -> &str {
        &self.catalog_name
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        self.read(|namespaces| namespaces.keys().cloned().collect())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        self.read(|namespaces| namespaces.contains_key(namespace))
    }

    async fn create_namespace(&self, namespace: &str) -> Result<bool> {
        let properties = initial_namespace_properties(self.warehouse.as_deref(), namespace);
        self.write(|namespaces| {
            if namespaces.contains_key(namespace) {
                return false;
            }
            let entry = namespaces.entry(namespace.to_string()).or_default();
            for (key, value) in properties {
                entry.properties.insert(key.to_string(), value);
            }
            true
        })
    }

    async fn namespace_properties(&self, namespace: &str) -> Result<BTreeMap<String, String>> {
        self.read(|namespaces| namespaces.get(namespace).map(|ns| ns.properties.clone()))?
            .ok_or_else(|| SyncError::NamespaceNotFound(namespace.to_string()))
    }

    async fn list_tables(&self, namespace: &str) -> Result<Vec<String>> {
        self.read(|namespaces| {
            namespaces
                .get(namespace)
                .map(|ns| ns.tables.keys().cloned().collect())
        })?
        .ok_or_else(|| SyncError::NamespaceNotFound(namespace.to_string()))
    }

    async fn load_table(&self, namespace: &str, table: &str) -> Result<Option<String>> {
        self.read(|namespaces| {
            namespaces
                .get(namespace)
                .and_then(|ns| ns.tables.get(table).cloned())
        })
    }

    async fn register_table(
        &self,
        namespace: &str,
        table: &str,
        metadata_location: &str,
    ) -> Result<()> {
        self.write(|namespaces| {
            let ns = namespaces
                .get_mut(namespace)
                .ok_or_else(|| SyncError::NamespaceNotFound(namespace.to_string()))?;
            if ns.tables.contains_key(table) {
                return Err(SyncError::TableAlreadyExists(format!("{namespace}.{table}")));
            }
            ns.tables
                .insert(table.to_string(), metadata_location.to_string());
            Ok(())
        })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_location() {
        assert_eq!(
            namespace_location("s3://acct/iceberg-warehouse/", "sales"),
            "s3://acct/iceberg-warehouse/sales.db"
        );
        assert_eq!(
            namespace_location("s3://acct/iceberg-warehouse", "sales"),
            "s3://acct/iceberg-warehouse/sales.db"
        );
    }

    #[test]
    fn test_connector_from_options() {
        let options = SessionOptions::new()
            .with("catalog.main.catalog-impl", "sql")
            .with("catalog.main.uri", "sqlite::memory:")
            .with("catalog.main.warehouse", "s3://acct/iceberg-warehouse/");
        let connector = CatalogConnector::from_options("main", &options).unwrap();
        assert_eq!(connector.catalog_impl, "sql");
        assert_eq!(connector.uri.as_deref(), Some("sqlite::memory:"));
        assert_eq!(connector.io_impl, "s3");
    }

    #[tokio::test]
    async fn test_sql_connector_requires_uri() {
        let options = SessionOptions::new().with("catalog.main.catalog-impl", "sql");
        let connector = CatalogConnector::from_options("main", &options).unwrap();
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_memory_backend_namespaces() {
        let backend = MemoryCatalogBackend::new("c", Some("s3://acct/wh/".to_string()));
        assert!(!backend.namespace_exists("db").await.unwrap());
        assert!(backend.create_namespace("db").await.unwrap());
        assert!(!backend.create_namespace("db").await.unwrap());
        assert_eq!(backend.list_namespaces().await.unwrap(), vec!["db"]);

        let properties = backend.namespace_properties("db").await.unwrap();
        assert_eq!(properties.get("exists").map(String::as_str), Some("true"));
        assert_eq!(
            properties.get("location").map(String::as_str),
            Some("s3://acct/wh/db.db")
        );
    }

    #[tokio::test]
    async fn test_memory_backend_register_table() {
        let backend = MemoryCatalogBackend::new("c", None);
        let err = backend
            .register_table("db", "t", "s3://b/t/metadata/00001-a.metadata.json")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NamespaceNotFound(_)));

        backend.create_namespace("db").await.unwrap();
        backend
            .register_table("db", "t", "s3://b/t/metadata/00001-a.metadata.json")
            .await
            .unwrap();
        assert_eq!(backend.list_tables("db").await.unwrap(), vec!["t"]);
        assert_eq!(
            backend.load_table("db", "t").await.unwrap().as_deref(),
            Some("s3://b/t/metadata/00001-a.metadata.json")
        );

        let err = backend
            .register_table("db", "t", "s3://b/t/metadata/00002-b.metadata.json")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::TableAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_memory_backend_list_missing_namespace() {
        let backend = MemoryCatalogBackend::new("c", None);
        let err = backend.list_tables("nope").await.unwrap_err();
        assert!(matches!(err, SyncError::NamespaceNotFound(_)));
        assert_eq!(backend.load_table("nope", "t").await.unwrap(), None);
    }
}
