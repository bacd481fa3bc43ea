//! Data store provider abstraction for object storage backends
//!
//! Resolves the object store serving a table location (S3, in-memory, local
//! filesystem) and registers it with DataFusion's runtime environment so the
//! metadata locator and the Iceberg table factory share one client per bucket.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use datafusion::datasource::object_store::ObjectStoreUrl;
use datafusion::execution::runtime_env::RuntimeEnv;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use url::Url;

use crate::session::{
    LOCAL_ROOT, S3_ACCESS_KEY_ID, S3_ALLOW_HTTP, S3_CREDENTIALS_PROVIDER, S3_ENDPOINT, S3_REGION,
    S3_SECRET_ACCESS_KEY, SessionOptions,
};
use crate::{Result, SyncError};

/// Trait for providing object store access to table locations
pub trait DataStoreProvider: Send + Sync + Debug {
    /// Ensure an object store serving `location` is registered with `runtime_env`
    ///
    /// Returns the `ObjectStoreUrl` (`scheme://bucket/`) the store was registered under.
    fn ensure_object_store(
        &self,
        location: &str,
        runtime_env: &Arc<RuntimeEnv>,
    ) -> Result<ObjectStoreUrl>;
}

/// Build the provider named by a catalog connector's `io-impl` setting.
pub fn provider_for_io_impl(
    io_impl: &str,
    options: &SessionOptions,
) -> Result<Arc<dyn DataStoreProvider>> {
    match io_impl {
        "s3" => Ok(Arc::new(S3Provider::from_options(options))),
        "memory" => Ok(Arc::new(InMemoryProvider::new())),
        "local" => Ok(Arc::new(match options.get(LOCAL_ROOT) {
            Some(root) => LocalFileSystemProvider::with_root(root),
            None => LocalFileSystemProvider::new(),
        })),
        other => Err(SyncError::Unsupported(format!(
            "Unsupported io implementation: {other}. Supported: s3, memory, local"
        ))),
    }
}

/// Return the object store for `location`, registering one through `provider`
/// if the runtime has none for that bucket yet.
pub fn resolve_object_store(
    provider: &dyn DataStoreProvider,
    location: &str,
    runtime_env: &Arc<RuntimeEnv>,
) -> Result<Arc<dyn ObjectStore>> {
    let store_url = store_url_for(location)?;
    if let Ok(store) = runtime_env.object_store(&store_url) {
        return Ok(store);
    }
    let registered = provider.ensure_object_store(location, runtime_env)?;
    Ok(runtime_env.object_store(&registered)?)
}

/// Split a location into its scheme and bucket, e.g. `s3://bucket/a/b` -> (`s3`, `bucket`).
pub fn parse_bucket(location: &str) -> Result<(String, String)> {
    let url = Url::parse(location)?;
    let bucket = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| SyncError::InvalidConfig(format!("Location missing bucket: {location}")))?;
    Ok((url.scheme().to_string(), bucket.to_string()))
}

/// Root URL (`scheme://bucket/`) under which the store for `location` is registered.
pub fn store_url_for(location: &str) -> Result<ObjectStoreUrl> {
    let (scheme, bucket) = parse_bucket(location)?;
    Ok(ObjectStoreUrl::parse(format!("{scheme}://{bucket}/"))?)
}

/// S3 data store provider with explicit configuration
///
/// Credentials, region and endpoint come from the session's storage options
/// rather than the process environment.
#[derive(Clone, Default)]
pub struct S3Provider {
    region: Option<String>,
    endpoint: Option<String>,
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    allow_http: bool,
}

impl Debug for S3Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Provider")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("has_credentials", &self.access_key_id.is_some())
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

impl S3Provider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `storage.s3.*` session options.
    ///
    /// Empty credential values are treated as absent, leaving the S3 client
    /// to its own credential chain.
    pub fn from_options(options: &SessionOptions) -> Self {
        let non_empty = |key: &str| {
            options
                .get(key)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let mut provider = Self {
            region: non_empty(S3_REGION),
            endpoint: non_empty(S3_ENDPOINT),
            access_key_id: None,
            secret_access_key: None,
            allow_http: options.get(S3_ALLOW_HTTP) == Some("true"),
        };

        let static_credentials =
            options.get(S3_CREDENTIALS_PROVIDER).is_none_or(|p| p == "static");
        if static_credentials
            && let (Some(key_id), Some(secret)) =
                (non_empty(S3_ACCESS_KEY_ID), non_empty(S3_SECRET_ACCESS_KEY))
        {
            provider = provider.with_credentials(key_id, secret);
        }
        provider
    }

    /// Set AWS credentials explicitly
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn has_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

impl DataStoreProvider for S3Provider {
    fn ensure_object_store(
        &self,
        location: &str,
        runtime_env: &Arc<RuntimeEnv>,
    ) -> Result<ObjectStoreUrl> {
        let (scheme, bucket) = parse_bucket(location)?;
        if scheme != "s3" && scheme != "s3a" {
            return Err(SyncError::InvalidConfig(format!(
                "S3Provider only supports s3:// locations, got: {location}"
            )));
        }

        let mut builder = AmazonS3Builder::new().with_bucket_name(&bucket);
        if let Some(ref region) = self.region {
            builder = builder.with_region(region);
        }
        if let Some(ref endpoint) = self.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let (Some(key_id), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }
        if self.allow_http {
            builder = builder
                .with_allow_http(true)
                .with_virtual_hosted_style_request(false);
        }

        let s3_store = builder.build().map_err(|e| {
            SyncError::Internal(format!(
                "Failed to build S3 client for bucket '{bucket}': {e}"
            ))
        })?;
        tracing::debug!(bucket = %bucket, "registered S3 object store");

        let store_url = store_url_for(location)?;
        runtime_env.register_object_store(store_url.as_ref(), Arc::new(s3_store));
        Ok(store_url)
    }
}

/// In-memory data store provider
///
/// Registers a fresh `InMemory` store for each bucket it is asked about.
/// Used for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider;

impl InMemoryProvider {
    pub fn new() -> Self {
        Self
    }
}

impl DataStoreProvider for InMemoryProvider {
    fn ensure_object_store(
        &self,
        location: &str,
        runtime_env: &Arc<RuntimeEnv>,
    ) -> Result<ObjectStoreUrl> {
        let store_url = store_url_for(location)?;
        runtime_env.register_object_store(store_url.as_ref(), Arc::new(InMemory::new()));
        Ok(store_url)
    }
}

/// Local filesystem data store provider
///
/// Maps each bucket to a directory below `root`, so with the default root
/// `s3://bucket/a/b` reads `/bucket/a/b`.
#[derive(Debug, Clone)]
pub struct LocalFileSystemProvider {
    root: PathBuf,
}

impl LocalFileSystemProvider {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
        }
    }
}

impl Default for LocalFileSystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DataStoreProvider for LocalFileSystemProvider {
    fn ensure_object_store(
        &self,
        location: &str,
        runtime_env: &Arc<RuntimeEnv>,
    ) -> Result<ObjectStoreUrl> {
        let (_, bucket) = parse_bucket(location)?;
        let bucket_root = self.root.join(&bucket);
        let store = LocalFileSystem::new_with_prefix(&bucket_root).map_err(|e| {
            SyncError::InvalidConfig(format!(
                "Failed to open local bucket directory '{}': {}",
                bucket_root.display(),
                e
            ))
        })?;

        let store_url = store_url_for(location)?;
        runtime_env.register_object_store(store_url.as_ref(), Arc::new(store));
        Ok(store_url)
    }
}
