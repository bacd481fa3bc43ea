//! Iceberg catalog provider implementation

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use datafusion::catalog::{CatalogProvider, SchemaProvider};
use datafusion::error::Result as DataFusionResult;
use datafusion::execution::runtime_env::RuntimeEnv;

use crate::catalog_backend::CatalogBackend;
use crate::data_store_provider::DataStoreProvider;
use crate::schema::IcebergSchemaProvider;

/// Run an async backend call from DataFusion's synchronous catalog methods.
///
/// Requires a multi-threaded Tokio runtime.
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}

/// Iceberg catalog provider
///
/// Maps DataFusion schemas onto catalog namespaces. Namespaces and tables are
/// looked up in the backend on demand, so registrations made through another
/// session are visible without a reload.
#[derive(Debug)]
pub struct IcebergCatalogProvider {
    backend: Arc<dyn CatalogBackend>,
    /// Used to read table metadata when a table is resolved
    data_store: Arc<dyn DataStoreProvider>,
    runtime_env: Arc<RuntimeEnv>,
}

impl IcebergCatalogProvider {
    pub fn new(
        backend: Arc<dyn CatalogBackend>,
        data_store: Arc<dyn DataStoreProvider>,
        runtime_env: Arc<RuntimeEnv>,
    ) -> Self {
        Self {
            backend,
            data_store,
            runtime_env,
        }
    }

    pub fn backend(&self) -> &Arc<dyn CatalogBackend> {
        &self.backend
    }
}

impl CatalogProvider for IcebergCatalogProvider {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema_names(&self) -> Vec<String> {
        block_on(self.backend.list_namespaces()).unwrap_or_default()
    }

    fn schema(&self, name: &str) -> Option<Arc<dyn SchemaProvider>> {
        match block_on(self.backend.namespace_exists(name)) {
            Ok(true) => Some(Arc::new(IcebergSchemaProvider::new(
                name,
                Arc::clone(&self.backend),
                Arc::clone(&self.data_store),
                Arc::clone(&self.runtime_env),
            )) as Arc<dyn SchemaProvider>),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(namespace = name, error = %e, "failed to look up namespace");
                None
            },
        }
    }

    /// Creates the namespace in the backend; the passed provider is not retained.
    fn register_schema(
        &self,
        name: &str,
        _schema: Arc<dyn SchemaProvider>,
    ) -> DataFusionResult<Option<Arc<dyn SchemaProvider>>> {
        let created = block_on(self.backend.create_namespace(name))?;
        tracing::debug!(
            catalog = self.backend.catalog_name(),
            namespace = name,
            created,
            "registered namespace"
        );
        Ok(None)
    }
}
