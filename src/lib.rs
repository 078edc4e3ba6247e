//! Playground Core
//!
//! Manages the compiler backend of an in-browser compiler playground: which
//! compiler versions exist, which of them are known to work, and the single
//! compiler module instance that is active at any time.
//!
//! # Components
//!
//! - [`versions`]: registry catalog, preview/production classification, views
//! - [`storage`]: durable compatibility verdicts and the last-used pointer
//! - [`lifecycle`]: fetch, probe, install and tear down compiler modules
//! - [`output`]: parse / transform / convert outputs bound to the active module
//!
//! # Boundaries
//!
//! - Network: none in-crate. Registry queries and module imports go through
//!   [`versions::RegistryClient`] and [`lifecycle::ModuleResolver`].
//! - Storage: any [`storage::KeyValueStore`]; `FileStore` writes one file per key.
//! - Modules: opaque [`compiler::CompilerModule`] implementations; every call is
//!   guarded so a failing or panicking module degrades instead of unwinding.

pub mod cli;
pub mod compiler;
pub mod config;
pub mod lifecycle;
pub mod output;
pub mod storage;
pub mod telemetry;
pub mod versions;

use std::sync::Arc;
use std::time::Duration;

use config::EnvConfig;
use lifecycle::{
    LifecycleConfig, ModuleFetcher, ModuleLifecycleManager, ModuleResolver, DEFAULT_CDN_PREFIX,
    DEFAULT_RUNTIME_ASSET,
};
use output::OutputLayer;
use storage::{CompatibilityStore, KeyValueStore, DEFAULT_VERDICT_TTL};
use versions::{FetchError, RegistryClient, VersionCatalog, VersionsView, DEFAULT_REGISTRY_URL};

/// Playground configuration.
#[derive(Debug, Clone)]
pub struct PlaygroundConfig {
    pub registry_url: String,
    pub cdn_prefix: String,
    pub runtime_asset: String,
    pub catalog_ttl: Duration,
    pub verdict_ttl: Duration,
    pub lifecycle: LifecycleConfig,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            cdn_prefix: DEFAULT_CDN_PREFIX.to_string(),
            runtime_asset: DEFAULT_RUNTIME_ASSET.to_string(),
            catalog_ttl: Duration::from_secs(10),
            verdict_ttl: DEFAULT_VERDICT_TTL,
            lifecycle: LifecycleConfig::default(),
        }
    }
}

impl From<&EnvConfig> for PlaygroundConfig {
    fn from(env: &EnvConfig) -> Self {
        Self {
            registry_url: env.registry_url.clone(),
            cdn_prefix: env.cdn_prefix.clone(),
            runtime_asset: env.runtime_asset.clone(),
            catalog_ttl: env.catalog_ttl,
            verdict_ttl: env.verdict_ttl,
            lifecycle: LifecycleConfig {
                drain_timeout: env.drain_timeout,
            },
        }
    }
}

/// The wired-up playground core. One per running application.
pub struct Playground {
    pub catalog: Arc<VersionCatalog>,
    pub store: Arc<CompatibilityStore>,
    pub outputs: Arc<OutputLayer>,
    pub lifecycle: Arc<ModuleLifecycleManager>,
}

impl Playground {
    /// Create a playground over the given transports and storage.
    pub fn new(
        config: PlaygroundConfig,
        registry: Arc<dyn RegistryClient>,
        resolver: Arc<dyn ModuleResolver>,
        kv: Arc<dyn KeyValueStore>,
    ) -> Self {
        telemetry::init_metrics();

        let catalog = Arc::new(VersionCatalog::new(registry, config.registry_url, config.catalog_ttl));
        let store = Arc::new(CompatibilityStore::new(kv, config.verdict_ttl));
        let outputs = Arc::new(OutputLayer::new());
        let fetcher = ModuleFetcher::new(resolver, config.cdn_prefix, config.runtime_asset);
        let lifecycle = Arc::new(ModuleLifecycleManager::new(
            fetcher,
            store.clone(),
            catalog.clone(),
            outputs.clone(),
            config.lifecycle,
        ));

        Self {
            catalog,
            store,
            outputs,
            lifecycle,
        }
    }

    /// A version selector view over the current catalog.
    pub async fn versions_view(&self, force_refresh: bool) -> Result<VersionsView, FetchError> {
        let partition = self.catalog.partitioned(force_refresh).await?;
        Ok(VersionsView::new(partition))
    }
}
