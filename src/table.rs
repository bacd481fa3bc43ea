//! Iceberg table provider and the factory behind `CREATE EXTERNAL TABLE ... STORED AS ICEBERG`

use std::any::Any;
use std::sync::Arc;

use arrow::datatypes::SchemaRef;
use async_trait::async_trait;
use datafusion::catalog::{Session, TableProvider, TableProviderFactory};
use datafusion::error::{DataFusionError, Result as DataFusionResult};
use datafusion::logical_expr::{CreateExternalTable, Expr, TableType};
use datafusion::physical_plan::ExecutionPlan;
use object_store::ObjectStore;

use crate::Result;
use crate::data_store_provider::{DataStoreProvider, resolve_object_store};
use crate::types::TableMetadata;

/// `STORED AS` keyword routed to [`IcebergTableFactory`]
pub const ICEBERG_FILE_TYPE: &str = "ICEBERG";

/// A registered Iceberg table
///
/// Exposes the current schema of the metadata file it is bound to. Reading
/// data files is not supported.
#[derive(Debug)]
pub struct IcebergTable {
    table_name: String,
    metadata_location: String,
    table_uuid: Option<String>,
    format_version: i32,
    schema: SchemaRef,
}

impl IcebergTable {
    /// Load the table by reading its metadata file through `store`.
    pub async fn load(
        table_name: impl Into<String>,
        metadata_location: impl Into<String>,
        store: &dyn ObjectStore,
    ) -> Result<Self> {
        let metadata_location = metadata_location.into();
        let metadata = TableMetadata::load(store, &metadata_location).await?;
        let schema = Arc::new(metadata.arrow_schema()?);
        Ok(Self {
            table_name: table_name.into(),
            metadata_location,
            table_uuid: metadata.table_uuid,
            format_version: metadata.format_version,
            schema,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Metadata file this table is bound to
    pub fn metadata_location(&self) -> &str {
        &self.metadata_location
    }

    pub fn table_uuid(&self) -> Option<&str> {
        self.table_uuid.as_deref()
    }

    pub fn format_version(&self) -> i32 {
        self.format_version
    }
}

#[async_trait]
impl TableProvider for IcebergTable {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    fn table_type(&self) -> TableType {
        TableType::Base
    }

    async fn scan(
        &self,
        _state: &dyn Session,
        _projection: Option<&Vec<usize>>,
        _filters: &[Expr],
        _limit: Option<usize>,
    ) -> DataFusionResult<Arc<dyn ExecutionPlan>> {
        Err(DataFusionError::NotImplemented(format!(
            "Scanning Iceberg table '{}' is not supported",
            self.table_name
        )))
    }
}

/// Builds [`IcebergTable`]s for `CREATE EXTERNAL TABLE ... STORED AS ICEBERG LOCATION '<metadata file>'`
#[derive(Debug)]
pub struct IcebergTableFactory {
    data_store: Arc<dyn DataStoreProvider>,
}

impl IcebergTableFactory {
    pub fn new(data_store: Arc<dyn DataStoreProvider>) -> Self {
        Self {
            data_store,
        }
    }
}

#[async_trait]
impl TableProviderFactory for IcebergTableFactory {
    async fn create(
        &self,
        state: &dyn Session,
        cmd: &CreateExternalTable,
    ) -> DataFusionResult<Arc<dyn TableProvider>> {
        let store = resolve_object_store(
            self.data_store.as_ref(),
            &cmd.location,
            state.runtime_env(),
        )?;
        let table = IcebergTable::load(cmd.name.table(), cmd.location.as_str(), store.as_ref())
            .await?;
        Ok(Arc::new(table))
    }
}
