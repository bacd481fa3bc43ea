//! Latest metadata file lookup
//!
//! Iceberg writers name metadata files `<version>-<uuid>.metadata.json` with a
//! zero-padded, monotonically increasing version, so the lexicographically
//! greatest key under `<table>/metadata/` is the newest one. That only holds
//! while every version in a directory has the same width; mixed widths are
//! reported but not reinterpreted.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use object_store::ObjectStore;
use object_store::path::Path;
use url::Url;

use crate::data_store_provider::parse_bucket;
use crate::{Result, SyncError};

/// Suffix identifying a table metadata descriptor
pub const METADATA_FILE_SUFFIX: &str = ".metadata.json";

/// Directory below the table root holding metadata descriptors
pub const METADATA_DIR: &str = "metadata";

/// Lazily lists object keys below a prefix, following pagination until exhausted
pub trait MetadataLister: Send + Sync {
    fn list_keys<'a>(&'a self, prefix: &'a Path) -> BoxStream<'a, Result<Path>>;
}

impl MetadataLister for Arc<dyn ObjectStore> {
    fn list_keys<'a>(&'a self, prefix: &'a Path) -> BoxStream<'a, Result<Path>> {
        self.list(Some(prefix))
            .map(|meta| meta.map(|m| m.location).map_err(SyncError::from))
            .boxed()
    }
}

/// A table root split into bucket and metadata prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLocation {
    scheme: String,
    bucket: String,
    metadata_prefix: Path,
}

impl TableLocation {
    /// Parse `scheme://bucket/path/to/table[/]`.
    ///
    /// The table path is taken from the parsed URL, so scheme case and
    /// userinfo do not affect the prefix. Percent-encoded segments are decoded.
    pub fn parse(location: &str) -> Result<Self> {
        let (scheme, bucket) = parse_bucket(location)?;
        let url = Url::parse(location)?;
        let table_path = url.path().trim_matches('/');
        let metadata_prefix = if table_path.is_empty() {
            Path::from(METADATA_DIR)
        } else {
            Path::from_url_path(table_path)
                .map_err(object_store::Error::from)?
                .child(METADATA_DIR)
        };

        Ok(Self {
            scheme,
            bucket,
            metadata_prefix,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Key prefix of the table's metadata directory
    pub fn metadata_prefix(&self) -> &Path {
        &self.metadata_prefix
    }

    /// Full URI for an object key in this table's bucket
    pub fn uri_for(&self, key: &Path) -> String {
        format!("{}://{}/{}", self.scheme, self.bucket, key)
    }
}

/// Find the latest metadata file for a table, propagating listing errors.
pub async fn find_latest_metadata(
    lister: &dyn MetadataLister,
    location: &TableLocation,
) -> Result<Option<String>> {
    let mut keys = Vec::new();
    let mut listing = lister.list_keys(location.metadata_prefix());
    while let Some(key) = listing.next().await {
        let key = key?;
        if key.as_ref().ends_with(METADATA_FILE_SUFFIX) {
            keys.push(key);
        }
    }

    if keys.is_empty() {
        return Ok(None);
    }

    if !has_uniform_version_width(&keys) {
        tracing::warn!(
            prefix = %location.metadata_prefix(),
            "metadata file versions have mixed widths; lexicographic order may not be chronological"
        );
    }

    keys.sort_by(|a, b| a.as_ref().cmp(b.as_ref()));
    Ok(keys.last().map(|key| location.uri_for(key)))
}

/// Find the latest metadata file for `location`.
///
/// Returns `None` when no metadata file exists or the location cannot be
/// listed; failures are logged, never propagated.
pub async fn locate_latest_metadata(
    lister: &dyn MetadataLister,
    location: &str,
) -> Option<String> {
    let parsed = match TableLocation::parse(location) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(location, error = %e, "invalid table location");
            return None;
        },
    };

    match find_latest_metadata(lister, &parsed).await {
        Ok(Some(metadata)) => Some(metadata),
        Ok(None) => {
            tracing::info!(location, "no metadata files found");
            None
        },
        Err(e) => {
            tracing::warn!(location, error = %e, "error accessing object storage");
            None
        },
    }
}

/// Version token of a metadata file name: everything before the first `-` or `.`.
fn version_token(key: &Path) -> &str {
    let file_name = key.filename().unwrap_or_default();
    file_name
        .split(['-', '.'])
        .next()
        .unwrap_or(file_name)
}

fn has_uniform_version_width(keys: &[Path]) -> bool {
    let mut widths = keys.iter().map(|key| version_token(key).len());
    match widths.next() {
        Some(first) => widths.all(|width| width == first),
        None => true,
    }
}
