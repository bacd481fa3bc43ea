//! Sync configuration loaded from YAML
//!
//! The file enumerates the target catalog, the AWS account and region the
//! warehouse lives in, and the databases/tables whose Iceberg metadata should
//! be registered:
//!
//! ```yaml
//! catalog_name: mydatacatalog
//! aws_account_id: "123456789012"
//! aws_region: eu-west-1
//! databases:
//!   - name: sales
//!     tables:
//!       - name: orders
//!         location: s3://123456789012/warehouse/sales/orders
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::{Result, SyncError};

/// Maximum allowed length for catalog entity names (catalogs, namespaces, tables).
pub const MAX_NAME_LENGTH: usize = 1024;

/// Default connection string for the SQL catalog backend.
pub const DEFAULT_CATALOG_URI: &str = "sqlite://iceberg_catalog.db?mode=rwc";

/// Validate a catalog entity name.
///
/// Rejects names that are:
/// - Empty or whitespace-only
/// - Contain ASCII control characters (0x00-0x1F, 0x7F)
/// - Exceed [`MAX_NAME_LENGTH`] characters
pub fn validate_name(name: &str, kind: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SyncError::InvalidConfig(format!(
            "{kind} name cannot be empty or whitespace-only"
        )));
    }
    if let Some(pos) = name.find(|c: char| c.is_ascii_control()) {
        let byte = name.as_bytes()[pos];
        return Err(SyncError::InvalidConfig(format!(
            "{kind} name contains control character 0x{byte:02X} at position {pos}"
        )));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(SyncError::InvalidConfig(format!(
            "{kind} name exceeds maximum length of {MAX_NAME_LENGTH} characters (got {})",
            name.len()
        )));
    }
    Ok(())
}

/// Top-level sync configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SyncConfig {
    /// Catalog identifier used in every issued statement
    pub catalog_name: String,
    /// AWS account owning the warehouse bucket
    pub aws_account_id: String,
    /// AWS region of the storage endpoint
    pub aws_region: String,
    /// Engine package identifiers, recorded in the session options
    #[serde(default)]
    pub packages: Vec<String>,
    /// Connection string for the SQL catalog backend
    #[serde(default = "default_catalog_uri")]
    pub catalog_uri: String,
    /// Catalog implementation (`sql` or `memory`)
    #[serde(default = "default_catalog_impl")]
    pub catalog_impl: String,
    /// Object store implementation (`s3`, `memory` or `local`)
    #[serde(default = "default_io_impl")]
    pub io_impl: String,
    /// Engine options merged over the generated defaults
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub databases: Vec<DatabaseConfig>,
}

/// A database (catalog namespace) and the tables to register in it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub tables: Vec<TableConfig>,
}

/// A single Iceberg table and its storage location
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TableConfig {
    pub name: String,
    /// Table root, e.g. `s3://bucket/warehouse/db/table`
    pub location: String,
}

fn default_catalog_uri() -> String {
    DEFAULT_CATALOG_URI.to_string()
}

fn default_catalog_impl() -> String {
    "sql".to_string()
}

fn default_io_impl() -> String {
    "s3".to_string()
}

impl SyncConfig {
    /// Read, parse and validate a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|e| {
            SyncError::InvalidConfig(format!("Failed to read '{}': {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SyncConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check names and table locations.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.catalog_name, "Catalog")?;
        for database in &self.databases {
            validate_name(&database.name, "Database")?;
            for table in &database.tables {
                validate_name(&table.name, "Table")?;
                validate_location(&table.location).map_err(|e| {
                    SyncError::InvalidConfig(format!(
                        "Table {}.{}: {}",
                        database.name, table.name, e
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Warehouse root derived from the account identifier.
    pub fn warehouse_path(&self) -> String {
        format!("s3://{}/iceberg-warehouse/", self.aws_account_id)
    }

    /// Total number of configured tables across all databases.
    pub fn table_count(&self) -> usize {
        self.databases.iter().map(|db| db.tables.len()).sum()
    }
}

fn validate_location(location: &str) -> Result<()> {
    if location.trim().is_empty() {
        return Err(SyncError::InvalidConfig(
            "storage location cannot be empty".to_string(),
        ));
    }
    let url = Url::parse(location)?;
    if url.host_str().is_none_or(str::is_empty) {
        return Err(SyncError::InvalidConfig(format!(
            "storage location missing bucket: {location}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
catalog_name: mydatacatalog
aws_account_id: "acct123"
aws_region: eu-west-1
packages:
  - org.apache.iceberg:iceberg-spark-runtime-3.5_2.12:1.6.1
  - software.amazon.awssdk:bundle:2.20.160
databases:
  - name: db1
    tables:
      - name: tbl1
        location: s3://acct123/warehouse/db1/tbl1
      - name: tbl2
        location: s3://acct123/warehouse/db1/tbl2/
  - name: db2
    tables:
      - name: events
        location: s3://other-bucket/events
"#;

    #[test]
    fn test_parse_sample() {
        let config = SyncConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.catalog_name, "mydatacatalog");
        assert_eq!(config.aws_account_id, "acct123");
        assert_eq!(config.packages.len(), 2);
        assert_eq!(config.databases.len(), 2);
        assert_eq!(config.table_count(), 3);
        assert_eq!(config.databases[0].tables[1].name, "tbl2");
        assert_eq!(config.catalog_uri, DEFAULT_CATALOG_URI);
        assert_eq!(config.catalog_impl, "sql");
        assert_eq!(config.io_impl, "s3");
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_packages_default_to_empty() {
        let yaml = r#"
catalog_name: c
aws_account_id: "1"
aws_region: us-east-1
databases: []
"#;
        let config = SyncConfig::from_yaml_str(yaml).unwrap();
        assert!(config.packages.is_empty());
        assert_eq!(config.table_count(), 0);
    }

    #[test]
    fn test_missing_required_key() {
        let yaml = r#"
catalog_name: c
aws_region: us-east-1
databases: []
"#;
        let err = SyncConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, SyncError::Yaml(_)));
    }

    #[test]
    fn test_empty_location_rejected() {
        let yaml = r#"
catalog_name: c
aws_account_id: "1"
aws_region: us-east-1
databases:
  - name: db
    tables:
      - name: t
        location: ""
"#;
        let err = SyncConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
        assert!(err.to_string().contains("db.t"));
    }

    #[test]
    fn test_location_without_bucket_rejected() {
        assert!(validate_location("s3:///no-bucket").is_err());
        assert!(validate_location("not a url").is_err());
        assert!(validate_location("s3://bucket/path").is_ok());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("orders", "Table").is_ok());
        assert!(validate_name("  ", "Table").is_err());
        assert!(validate_name("bad\u{7}name", "Table").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LENGTH + 1), "Table").is_err());
    }

    #[test]
    fn test_warehouse_path() {
        let config = SyncConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.warehouse_path(), "s3://acct123/iceberg-warehouse/");
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = SyncConfig::from_path("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_path_malformed_yaml() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("sync.yaml");
        fs::write(&path, "catalog_name: [unterminated\ndatabases: {").unwrap();

        let err = SyncConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, SyncError::Yaml(_)));
    }

    #[test]
    fn test_from_path_invalid_location() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("sync.yaml");
        fs::write(&path, SAMPLE.replace("s3://acct123/warehouse/db1/tbl1", "not a url")).unwrap();

        let err = SyncConfig::from_path(&path).unwrap_err();
        assert!(matches!(err, SyncError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_path_sample() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("sync.yaml");
        fs::write(&path, SAMPLE).unwrap();

        let config = SyncConfig::from_path(&path).unwrap();
        assert_eq!(config.table_count(), 3);
    }
}
