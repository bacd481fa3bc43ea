//! Iceberg schema provider implementation

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use datafusion::catalog::{SchemaProvider, TableProvider};
use datafusion::error::{DataFusionError, Result as DataFusionResult};
use datafusion::execution::runtime_env::RuntimeEnv;

use crate::catalog::block_on;
use crate::catalog_backend::CatalogBackend;
use crate::data_store_provider::{DataStoreProvider, resolve_object_store};
use crate::table::IcebergTable;

/// Iceberg schema provider
///
/// Represents one catalog namespace. Table lookups go to the backend on each
/// call.
#[derive(Debug)]
pub struct IcebergSchemaProvider {
    namespace: String,
    backend: Arc<dyn CatalogBackend>,
    data_store: Arc<dyn DataStoreProvider>,
    runtime_env: Arc<RuntimeEnv>,
}

impl IcebergSchemaProvider {
    pub fn new(
        namespace: impl Into<String>,
        backend: Arc<dyn CatalogBackend>,
        data_store: Arc<dyn DataStoreProvider>,
        runtime_env: Arc<RuntimeEnv>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            backend,
            data_store,
            runtime_env,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl SchemaProvider for IcebergSchemaProvider {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn table_names(&self) -> Vec<String> {
        block_on(self.backend.list_tables(&self.namespace)).unwrap_or_default()
    }

    async fn table(&self, name: &str) -> DataFusionResult<Option<Arc<dyn TableProvider>>> {
        let Some(metadata_location) = self.backend.load_table(&self.namespace, name).await? else {
            return Ok(None);
        };

        let store = resolve_object_store(
            self.data_store.as_ref(),
            &metadata_location,
            &self.runtime_env,
        )?;
        let table = IcebergTable::load(name, metadata_location, store.as_ref()).await?;
        Ok(Some(Arc::new(table) as Arc<dyn TableProvider>))
    }

    /// Persists the table's metadata location; only [`IcebergTable`]s can be registered.
    fn register_table(
        &self,
        name: String,
        table: Arc<dyn TableProvider>,
    ) -> DataFusionResult<Option<Arc<dyn TableProvider>>> {
        let iceberg = table
            .as_any()
            .downcast_ref::<IcebergTable>()
            .ok_or_else(|| {
                DataFusionError::NotImplemented(format!(
                    "Only Iceberg tables can be registered in namespace '{}'",
                    self.namespace
                ))
            })?;

        block_on(self.backend.register_table(
            &self.namespace,
            &name,
            iceberg.metadata_location(),
        ))?;
        Ok(None)
    }

    fn table_exist(&self, name: &str) -> bool {
        block_on(self.backend.load_table(&self.namespace, name))
            .map(|location| location.is_some())
            .unwrap_or(false)
    }
}
