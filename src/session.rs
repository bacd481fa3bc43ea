//! Session builder
//!
//! Builds the DataFusion session every catalog statement is issued through.
//! Options are a flat key/value map: `datafusion.*` keys configure the
//! engine, `storage.s3.*` keys configure object storage access and
//! `catalog.<id>.*` keys declare catalog connectors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use datafusion::dataframe::DataFrame;
use datafusion::execution::runtime_env::{RuntimeEnv, RuntimeEnvBuilder};
use datafusion::execution::session_state::SessionStateBuilder;
use datafusion::prelude::{SessionConfig, SessionContext};
use object_store::ObjectStore;

use crate::Result;
use crate::catalog::IcebergCatalogProvider;
use crate::catalog_backend::{CatalogBackend, CatalogConnector};
use crate::data_store_provider::{DataStoreProvider, provider_for_io_impl, resolve_object_store};
use crate::table::{ICEBERG_FILE_TYPE, IcebergTableFactory};

pub const S3_ACCESS_KEY_ID: &str = "storage.s3.access-key-id";
pub const S3_SECRET_ACCESS_KEY: &str = "storage.s3.secret-access-key";
pub const S3_ENDPOINT: &str = "storage.s3.endpoint";
pub const S3_REGION: &str = "storage.s3.region";
pub const S3_IMPL: &str = "storage.s3.impl";
pub const S3_CREDENTIALS_PROVIDER: &str = "storage.s3.credentials-provider";
pub const S3_ALLOW_HTTP: &str = "storage.s3.allow-http";
pub const LOCAL_ROOT: &str = "storage.local.root";

const DATAFUSION_PREFIX: &str = "datafusion.";
const CATALOG_PREFIX: &str = "catalog.";
const CATALOG_IMPL_SUFFIX: &str = ".catalog-impl";
const DEFAULT_IO_IMPL: &str = "s3";

/// Storage access protocol selecting the default option set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProtocol {
    /// S3 with static credentials and a regional endpoint
    S3a,
}

/// Object storage credentials, injected by the caller
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StorageCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl StorageCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, empty when unset.
    pub fn from_env() -> Self {
        Self {
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
        }
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("access_key_id", &redact(&self.access_key_id))
            .field("secret_access_key", &redact(&self.secret_access_key))
            .finish()
    }
}

/// Account/region settings for the session
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub region: String,
    pub credentials: StorageCredentials,
}

impl StorageSettings {
    pub fn new(region: impl Into<String>, credentials: StorageCredentials) -> Self {
        Self {
            region: region.into(),
            credentials,
        }
    }
}

/// Ordered engine configuration options
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    entries: BTreeMap<String, String>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Merge `other` into `self`; values from `other` win on collision.
    pub fn merge(&mut self, other: &SessionOptions) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Catalog connector ids declared through `catalog.<id>.catalog-impl`.
    pub fn catalog_ids(&self) -> BTreeSet<String> {
        self.entries
            .keys()
            .filter_map(|key| {
                key.strip_prefix(CATALOG_PREFIX)?
                    .strip_suffix(CATALOG_IMPL_SUFFIX)
                    .filter(|id| !id.is_empty() && !id.contains('.'))
                    .map(str::to_string)
            })
            .collect()
    }

    /// Options addressed to DataFusion's `SessionConfig`.
    fn datafusion_options(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .filter(|(key, _)| key.starts_with(DATAFUSION_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl From<BTreeMap<String, String>> for SessionOptions {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(key, value)| {
                if is_sensitive(key) {
                    (key.as_str(), redact(value))
                } else {
                    (key.as_str(), value.as_str())
                }
            }))
            .finish()
    }
}

fn is_sensitive(key: &str) -> bool {
    key.contains("secret") || key.contains("access-key")
}

fn redact(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "***" }
}

/// Default options for `protocol`.
pub fn default_storage_options(
    settings: &StorageSettings,
    protocol: StorageProtocol,
) -> SessionOptions {
    match protocol {
        StorageProtocol::S3a => SessionOptions::new()
            .with(S3_ACCESS_KEY_ID, settings.credentials.access_key_id.clone())
            .with(
                S3_SECRET_ACCESS_KEY,
                settings.credentials.secret_access_key.clone(),
            )
            .with(
                S3_ENDPOINT,
                format!("https://s3.{}.amazonaws.com", settings.region),
            )
            .with(S3_REGION, settings.region.clone())
            .with(S3_IMPL, "amazon-s3")
            .with(S3_CREDENTIALS_PROVIDER, "static"),
    }
}

/// Build a session from storage settings and engine options.
///
/// Engine options are merged over the protocol defaults. Every declared
/// catalog connector is connected and registered under its id.
pub async fn build_session(
    settings: &StorageSettings,
    engine_options: &SessionOptions,
    protocol: StorageProtocol,
) -> Result<SyncSession> {
    let mut options = default_storage_options(settings, protocol);
    options.merge(engine_options);
    tracing::debug!(options = ?options, "building session");

    let config = SessionConfig::from_string_hash_map(&options.datafusion_options())?;
    let runtime_env = RuntimeEnvBuilder::new().build_arc()?;

    let connectors = options
        .catalog_ids()
        .into_iter()
        .map(|id| CatalogConnector::from_options(&id, &options))
        .collect::<Result<Vec<_>>>()?;

    // One io implementation serves the whole session; the first connector decides.
    let io_impl = connectors
        .first()
        .map(|c| c.io_impl.as_str())
        .unwrap_or(DEFAULT_IO_IMPL);
    let data_store = provider_for_io_impl(io_impl, &options)?;

    let state = SessionStateBuilder::new()
        .with_config(config)
        .with_runtime_env(Arc::clone(&runtime_env))
        .with_default_features()
        .with_table_factory(
            ICEBERG_FILE_TYPE.to_string(),
            Arc::new(IcebergTableFactory::new(Arc::clone(&data_store))),
        )
        .build();
    let ctx = SessionContext::new_with_state(state);

    let mut backends = Vec::with_capacity(connectors.len());
    for connector in &connectors {
        let backend = connector.connect().await?;
        let provider = IcebergCatalogProvider::new(
            Arc::clone(&backend),
            Arc::clone(&data_store),
            Arc::clone(&runtime_env),
        );
        ctx.register_catalog(connector.id.as_str(), Arc::new(provider));
        tracing::debug!(catalog = %connector.id, catalog_impl = %connector.catalog_impl, "registered catalog");
        backends.push(backend);
    }

    Ok(SyncSession {
        ctx,
        options,
        data_store,
        runtime_env,
        backends,
    })
}

/// A live engine session
///
/// Created once per run and released with [`SyncSession::stop`].
pub struct SyncSession {
    ctx: SessionContext,
    options: SessionOptions,
    data_store: Arc<dyn DataStoreProvider>,
    runtime_env: Arc<RuntimeEnv>,
    backends: Vec<Arc<dyn CatalogBackend>>,
}

impl fmt::Debug for SyncSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSession")
            .field("session_id", &self.ctx.session_id())
            .field("options", &self.options)
            .field("data_store", &self.data_store)
            .finish()
    }
}

impl SyncSession {
    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn runtime_env(&self) -> &Arc<RuntimeEnv> {
        &self.runtime_env
    }

    /// Execute one statement. DDL takes effect immediately.
    pub async fn sql(&self, statement: &str) -> Result<DataFrame> {
        tracing::debug!(statement, "executing statement");
        Ok(self.ctx.sql(statement).await?)
    }

    /// Object store serving `location`, registered on first use.
    pub fn object_store(&self, location: &str) -> Result<Arc<dyn ObjectStore>> {
        resolve_object_store(self.data_store.as_ref(), location, &self.runtime_env)
    }

    /// Release the session and close catalog connections.
    pub async fn stop(self) {
        for backend in &self.backends {
            backend.close().await;
        }
        tracing::debug!(session_id = %self.ctx.session_id(), "session stopped");
    }
}
