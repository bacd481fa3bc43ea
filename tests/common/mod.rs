//! Shared helpers for integration tests
//!
//! Sessions here use the in-memory object store and catalog unless a test
//! asks for something else, so no cloud account or database is needed.

#![allow(dead_code)]

use std::sync::Arc;

use iceberg_catalog_sync::SyncConfig;
use iceberg_catalog_sync::driver::engine_options;
use iceberg_catalog_sync::session::{StorageCredentials, StorageProtocol, StorageSettings};
use iceberg_catalog_sync::{SyncSession, build_session};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};

pub const BUCKET: &str = "acct123";
pub const CATALOG: &str = "mydatacatalog";

/// Table root under the test bucket, e.g. `s3://acct123/warehouse/db1/tbl1`.
pub fn table_location(database: &str, table: &str) -> String {
    format!("s3://{BUCKET}/warehouse/{database}/{table}")
}

/// Minimal format v2 metadata with an `id`/`name` schema.
pub fn metadata_json(table_location: &str) -> String {
    format!(
        r#"{{
            "format-version": 2,
            "table-uuid": "5f2c7a1e-0b6d-4c39-9a8e-2d4f1c3b7e90",
            "location": "{table_location}",
            "last-updated-ms": 1700000000000,
            "current-schema-id": 0,
            "schemas": [
                {{"type": "struct", "schema-id": 0, "fields": [
                    {{"id": 1, "name": "id", "required": true, "type": "long"}},
                    {{"id": 2, "name": "name", "required": false, "type": "string"}}
                ]}}
            ],
            "current-snapshot-id": 42
        }}"#
    )
}

/// Write `body` at `key` (relative to the bucket root).
pub async fn put(store: &dyn ObjectStore, key: &str, body: &str) {
    store
        .put(&Path::from(key), PutPayload::from(body.as_bytes().to_vec()))
        .await
        .unwrap();
}

/// Write a valid metadata file `file_name` into the table's metadata directory.
pub async fn put_metadata(store: &dyn ObjectStore, database: &str, table: &str, file_name: &str) {
    let location = table_location(database, table);
    put(
        store,
        &format!("warehouse/{database}/{table}/metadata/{file_name}"),
        &metadata_json(&location),
    )
    .await;
}

/// Config with an in-memory catalog and object store listing `databases`.
pub fn memory_config(databases: &[(&str, &[&str])]) -> SyncConfig {
    memory_config_named(CATALOG, databases)
}

/// Same as [`memory_config`] but addressing statements to `catalog_name`.
pub fn memory_config_named(catalog_name: &str, databases: &[(&str, &[&str])]) -> SyncConfig {
    let mut yaml = format!(
        "catalog_name: {catalog_name}\n\
         aws_account_id: \"{BUCKET}\"\n\
         aws_region: eu-west-1\n\
         catalog_impl: memory\n\
         io_impl: memory\n\
         databases:"
    );
    if databases.is_empty() {
        yaml.push_str(" []\n");
    } else {
        yaml.push('\n');
    }
    for (database, tables) in databases {
        yaml.push_str(&format!("  - name: {database}\n    tables:\n"));
        for table in *tables {
            yaml.push_str(&format!(
                "      - name: {table}\n        location: {}\n",
                table_location(database, table)
            ));
        }
    }
    SyncConfig::from_yaml_str(&yaml).unwrap()
}

/// Session built the same way a run builds it.
pub async fn session_for(config: &SyncConfig) -> SyncSession {
    let settings = StorageSettings::new(config.aws_region.clone(), StorageCredentials::default());
    build_session(&settings, &engine_options(config), StorageProtocol::S3a)
        .await
        .unwrap()
}

/// The object store a session uses for the test bucket.
pub fn bucket_store(session: &SyncSession) -> Arc<dyn ObjectStore> {
    session.object_store(&format!("s3://{BUCKET}/")).unwrap()
}
