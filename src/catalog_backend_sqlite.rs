//! SQLite implementation of [`CatalogBackend`].
//!
//! Uses the Iceberg SQL catalog tables (`iceberg_tables`,
//! `iceberg_namespace_properties`), so the database can be shared with other
//! Iceberg SQL catalog clients.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::catalog_backend::{CatalogBackend, initial_namespace_properties};
use crate::{Result, SyncError};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

const SQL_CREATE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS iceberg_tables (
    catalog_name VARCHAR(255) NOT NULL,
    table_namespace VARCHAR(255) NOT NULL,
    table_name VARCHAR(255) NOT NULL,
    metadata_location VARCHAR(1000),
    previous_metadata_location VARCHAR(1000),
    iceberg_type VARCHAR(5) DEFAULT 'TABLE',
    PRIMARY KEY (catalog_name, table_namespace, table_name)
);

CREATE TABLE IF NOT EXISTS iceberg_namespace_properties (
    catalog_name VARCHAR(255) NOT NULL,
    namespace VARCHAR(255) NOT NULL,
    property_key VARCHAR(255) NOT NULL,
    property_value VARCHAR(1000),
    PRIMARY KEY (catalog_name, namespace, property_key)
);
"#;

/// SQLite-based Iceberg catalog backend.
#[derive(Debug, Clone)]
pub struct SqliteCatalogBackend {
    pool: SqlitePool,
    catalog_name: String,
    warehouse: Option<String>,
}

impl SqliteCatalogBackend {
    /// Connect to the catalog database.
    ///
    /// In-memory databases (`sqlite::memory:`, `mode=memory`) exist per
    /// connection, so they get a single connection that is never recycled.
    pub async fn new(
        connection_string: &str,
        catalog_name: &str,
        warehouse: Option<String>,
    ) -> Result<Self> {
        let options = if is_in_memory(connection_string) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(DEFAULT_MAX_CONNECTIONS)
        };
        let pool = options.connect(connection_string).await?;
        Ok(Self {
            pool,
            catalog_name: catalog_name.to_string(),
            warehouse,
        })
    }

    /// Connect and create the catalog tables if missing.
    pub async fn new_with_init(
        connection_string: &str,
        catalog_name: &str,
        warehouse: Option<String>,
    ) -> Result<Self> {
        let backend = Self::new(connection_string, catalog_name, warehouse).await?;
        backend.initialize_schema().await?;
        Ok(backend)
    }

    pub async fn initialize_schema(&self) -> Result<()> {
        sqlx::raw_sql(SQL_CREATE_SCHEMA).execute(&self.pool).await?;
        Ok(())
    }
}

fn is_in_memory(connection_string: &str) -> bool {
    connection_string.contains(":memory:") || connection_string.contains("mode=memory")
}

#[async_trait]
impl CatalogBackend for SqliteCatalogBackend {
    fn catalog_name(&self) -> &str {
        &self.catalog_name
    }

    async fn list_namespaces(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT namespace FROM iceberg_namespace_properties WHERE catalog_name = ?
             UNION
             SELECT table_namespace FROM iceberg_tables WHERE catalog_name = ?
             ORDER BY 1",
        )
        .bind(&self.catalog_name)
        .bind(&self.catalog_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(row.try_get(0)?))
            .collect()
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let row = sqlx::query(
            "SELECT 1 FROM iceberg_namespace_properties WHERE catalog_name = ? AND namespace = ?
             UNION
             SELECT 1 FROM iceberg_tables WHERE catalog_name = ? AND table_namespace = ?
             LIMIT 1",
        )
        .bind(&self.catalog_name)
        .bind(namespace)
        .bind(&self.catalog_name)
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn create_namespace(&self, namespace: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            "SELECT 1 FROM iceberg_namespace_properties WHERE catalog_name = ? AND namespace = ?
             LIMIT 1",
        )
        .bind(&self.catalog_name)
        .bind(namespace)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Ok(false);
        }

        for (key, value) in initial_namespace_properties(self.warehouse.as_deref(), namespace) {
            sqlx::query(
                "INSERT INTO iceberg_namespace_properties
                 (catalog_name, namespace, property_key, property_value)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&self.catalog_name)
            .bind(namespace)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn namespace_properties(&self, namespace: &str) -> Result<BTreeMap<String, String>> {
        if !self.namespace_exists(namespace).await? {
            return Err(SyncError::NamespaceNotFound(namespace.to_string()));
        }

        let rows = sqlx::query(
            "SELECT property_key, property_value FROM iceberg_namespace_properties
             WHERE catalog_name = ? AND namespace = ?",
        )
        .bind(&self.catalog_name)
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let key: String = row.try_get(0)?;
                let value: Option<String> = row.try_get(1)?;
                Ok((key, value.unwrap_or_default()))
            })
            .collect()
    }

    async fn list_tables(&self, namespace: &str) -> Result<Vec<String>> {
        if !self.namespace_exists(namespace).await? {
            return Err(SyncError::NamespaceNotFound(namespace.to_string()));
        }

        let rows = sqlx::query(
            "SELECT table_name FROM iceberg_tables
             WHERE catalog_name = ? AND table_namespace = ?
             ORDER BY table_name",
        )
        .bind(&self.catalog_name)
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Ok(row.try_get(0)?))
            .collect()
    }

    async fn load_table(&self, namespace: &str, table: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT metadata_location FROM iceberg_tables
             WHERE catalog_name = ? AND table_namespace = ? AND table_name = ?",
        )
        .bind(&self.catalog_name)
        .bind(namespace)
        .bind(table)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>(0)?),
            None => Ok(None),
        }
    }

    async fn register_table(
        &self,
        namespace: &str,
        table: &str,
        metadata_location: &str,
    ) -> Result<()> {
        if !self.namespace_exists(namespace).await? {
            return Err(SyncError::NamespaceNotFound(namespace.to_string()));
        }

        let result = sqlx::query(
            "INSERT INTO iceberg_tables
             (catalog_name, table_namespace, table_name, metadata_location, previous_metadata_location)
             VALUES (?, ?, ?, ?, NULL)",
        )
        .bind(&self.catalog_name)
        .bind(namespace)
        .bind(table)
        .bind(metadata_location)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(
                SyncError::TableAlreadyExists(format!("{namespace}.{table}")),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
