//! Resolves a version to module code plus runtime asset locations.

use std::fmt;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use tracing::{debug, info, warn};

use super::error::ModuleLoadError;
use crate::compiler::{guarded, CompilerModule, ModuleError};
use crate::versions::VersionId;

pub const DEFAULT_CDN_PREFIX: &str = "https://esm.sh/@astrojs/compiler";
pub const DEFAULT_RUNTIME_ASSET: &str = "astro.wasm";

const VERSION_PATTERN: &str = r"^[0-9A-Za-z][0-9A-Za-z.+\-]*$";

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(VERSION_PATTERN).unwrap())
}

/// Where a module's binary runtime payload lives. Tried in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeAssetLocation {
    pub primary: String,
    pub fallback: String,
}

/// Dynamic import of module code by URL.
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    async fn import(&self, url: &str) -> Result<Arc<dyn CompilerModule>, ModuleLoadError>;
}

/// Resolver backed by a URL → module table filled in by the host.
#[derive(Default)]
pub struct StaticResolver {
    modules: DashMap<String, Arc<dyn CompilerModule>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, url: impl Into<String>, module: Arc<dyn CompilerModule>) {
        self.modules.insert(url.into(), module);
    }

    pub fn unregister(&self, url: &str) -> bool {
        self.modules.remove(url).is_some()
    }
}

#[async_trait]
impl ModuleResolver for StaticResolver {
    async fn import(&self, url: &str) -> Result<Arc<dyn CompilerModule>, ModuleLoadError> {
        self.modules
            .get(url)
            .map(|m| m.value().clone())
            .ok_or_else(|| ModuleLoadError::ImportFailed {
                url: url.to_string(),
                reason: "no module registered at this URL".into(),
            })
    }
}

/// Module code and asset locations for one version. Runtime not yet initialized.
#[derive(Clone)]
pub struct FetchedModule {
    pub version: VersionId,
    pub module: Arc<dyn CompilerModule>,
    pub assets: RuntimeAssetLocation,
}

impl fmt::Debug for FetchedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchedModule")
            .field("version", &self.version)
            .field("assets", &self.assets)
            .finish_non_exhaustive()
    }
}

/// Fetches module code per version, caching it for the session.
pub struct ModuleFetcher {
    resolver: Arc<dyn ModuleResolver>,
    cdn_prefix: String,
    runtime_asset: String,
    cache: DashMap<VersionId, FetchedModule>,
}

impl ModuleFetcher {
    pub fn new(
        resolver: Arc<dyn ModuleResolver>,
        cdn_prefix: impl Into<String>,
        runtime_asset: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            cdn_prefix: cdn_prefix.into().trim_end_matches('/').to_string(),
            runtime_asset: runtime_asset.into(),
            cache: DashMap::new(),
        }
    }

    /// `<cdn-prefix>@<version>`
    pub fn module_url(&self, version: &VersionId) -> String {
        format!("{}@{}", self.cdn_prefix, version)
    }

    /// `<module-url>/dist/<asset>`, falling back to `<module-url>/<asset>`.
    pub fn asset_location(&self, version: &VersionId) -> RuntimeAssetLocation {
        let base = self.module_url(version);
        RuntimeAssetLocation {
            primary: format!("{}/dist/{}", base, self.runtime_asset),
            fallback: format!("{}/{}", base, self.runtime_asset),
        }
    }

    /// Resolve `version` to its module and asset locations without initializing it.
    pub async fn fetch(&self, version: &VersionId) -> Result<FetchedModule, ModuleLoadError> {
        if !version_pattern().is_match(version.as_str()) {
            return Err(ModuleLoadError::InvalidVersion(version.to_string()));
        }

        if let Some(cached) = self.cache.get(version) {
            debug!(version = %version, "Compiler module served from session cache");
            return Ok(cached.value().clone());
        }

        let url = self.module_url(version);
        let module = match self.resolver.import(&url).await {
            Ok(module) => module,
            Err(e) => {
                warn!(version = %version, url = %url, error = %e, "Error fetching compiler module");
                return Err(e);
            }
        };

        let fetched = FetchedModule {
            version: version.clone(),
            module,
            assets: self.asset_location(version),
        };
        self.cache.insert(version.clone(), fetched.clone());
        info!(version = %version, url = %url, "Fetched compiler module");
        Ok(fetched)
    }

    pub fn is_cached(&self, version: &VersionId) -> bool {
        self.cache.contains_key(version)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}

/// Both asset URLs failed to initialize the runtime.
#[derive(Debug)]
pub(crate) struct InitFailure {
    pub primary: ModuleError,
    pub fallback: ModuleError,
}

/// Initialize `module` from the primary asset URL, then the fallback URL.
///
/// Returns the URL that succeeded.
pub(crate) async fn initialize_with_fallback<'a>(
    module: &dyn CompilerModule,
    assets: &'a RuntimeAssetLocation,
) -> Result<&'a str, InitFailure> {
    let primary = match guarded(module.initialize_runtime(&assets.primary)).await {
        Ok(()) => return Ok(&assets.primary),
        Err(e) => e,
    };
    debug!(url = %assets.primary, error = %primary, "Primary runtime asset failed, trying fallback");

    match guarded(module.initialize_runtime(&assets.fallback)).await {
        Ok(()) => Ok(&assets.fallback),
        Err(fallback) => Err(InitFailure { primary, fallback }),
    }
}
