//! Shared fakes for integration tests: a scriptable compiler module, a
//! counting resolver, and an in-memory registry.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use playground_core::compiler::{
    CompilerModule, ConvertOptions, ModuleError, ModuleOutput, ParseOptions, TransformOptions,
};
use playground_core::lifecycle::{
    LifecycleConfig, ModuleLifecycleManager, ModuleLoadError, ModuleResolver,
};
use playground_core::storage::{CompatibilityStatus, CompatibilityVerdict, MemoryStore};
use playground_core::versions::{FetchError, RegistryClient, VersionId};
use playground_core::{Playground, PlaygroundConfig};
use serde_json::{json, Map, Value};
use tokio::sync::{Notify, Semaphore};

pub const CDN_PREFIX: &str = "https://cdn.test/@scope/compiler";
pub const RUNTIME_ASSET: &str = "compiler.wasm";

/// Counts initialized runtimes across every fake in one test.
#[derive(Default)]
pub struct RuntimeMonitor {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl RuntimeMonitor {
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn up(&self) {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn down(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hold-and-release point inside a fake call.
pub struct Gate {
    closed: AtomicBool,
    permits: Semaphore,
    entered: Notify,
}

impl Gate {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            permits: Semaphore::new(0),
            entered: Notify::new(),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Let one blocked call through.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    /// Stop gating and let every blocked call through.
    pub fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
        self.permits.add_permits(64);
    }

    /// Wait until a call has reached the gate.
    pub async fn entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .expect("call never reached the gate");
    }

    async fn pass(&self) {
        if self.closed.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.permits.acquire().await.expect("gate closed").forget();
        }
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// A compiler module whose behaviour tests can script.
pub struct FakeCompiler {
    pub version: String,
    monitor: Arc<RuntimeMonitor>,
    initialized: AtomicBool,
    pub inits: AtomicUsize,
    pub teardowns: AtomicUsize,
    pub init_urls: Mutex<Vec<String>>,
    pub primary_asset_missing: AtomicBool,
    pub all_assets_missing: AtomicBool,
    pub transform_broken: AtomicBool,
    pub init_gate: Gate,
    pub transform_gate: Gate,
}

impl FakeCompiler {
    pub fn new(version: &str, monitor: Arc<RuntimeMonitor>) -> Self {
        Self {
            version: version.to_string(),
            monitor,
            initialized: AtomicBool::new(false),
            inits: AtomicUsize::new(0),
            teardowns: AtomicUsize::new(0),
            init_urls: Mutex::new(Vec::new()),
            primary_asset_missing: AtomicBool::new(false),
            all_assets_missing: AtomicBool::new(false),
            transform_broken: AtomicBool::new(false),
            init_gate: Gate::new(),
            transform_gate: Gate::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    fn require_runtime(&self) -> Result<(), ModuleError> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ModuleError::new("runtime not initialized"))
        }
    }
}

#[async_trait]
impl CompilerModule for FakeCompiler {
    async fn initialize_runtime(&self, asset_url: &str) -> Result<(), ModuleError> {
        self.init_urls.lock().push(asset_url.to_string());
        self.init_gate.pass().await;

        let primary = asset_url.contains("/dist/");
        if self.all_assets_missing.load(Ordering::SeqCst)
            || (primary && self.primary_asset_missing.load(Ordering::SeqCst))
        {
            return Err(ModuleError::new(format!("404 {}", asset_url)));
        }
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(ModuleError::new("runtime already initialized"));
        }
        self.inits.fetch_add(1, Ordering::SeqCst);
        self.monitor.up();
        Ok(())
    }

    async fn teardown_runtime(&self) -> Result<(), ModuleError> {
        if self.initialized.swap(false, Ordering::SeqCst) {
            self.monitor.down();
        }
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn parse(&self, source: &str, _: &ParseOptions) -> Result<ModuleOutput, ModuleError> {
        self.require_runtime()?;
        Ok(ModuleOutput::new(json!({
            "ast": {"type": "root", "compiler": self.version, "length": source.len()},
            "diagnostics": [],
        })))
    }

    async fn transform(&self, source: &str, _: &TransformOptions) -> Result<ModuleOutput, ModuleError> {
        self.require_runtime()?;
        self.transform_gate.pass().await;
        if self.transform_broken.load(Ordering::SeqCst) {
            return Err(ModuleError::new("unreachable"));
        }
        Ok(ModuleOutput::new(json!({
            "code": format!("/* compiler {} */ render(`{}`)", self.version, source),
            "diagnostics": [],
        })))
    }

    async fn convert_to_alternate_syntax(&self, _: &str, _: &ConvertOptions) -> Result<ModuleOutput, ModuleError> {
        self.require_runtime()?;
        Ok(ModuleOutput::new(json!({
            "code": format!(
                "// compiler {}\n//# sourceMappingURL=data:application/json;base64,e30=",
                self.version
            ),
            "diagnostics": [],
        })))
    }
}

/// URL → module table that counts import attempts.
#[derive(Default)]
pub struct CountingResolver {
    modules: DashMap<String, Arc<FakeCompiler>>,
    imports: DashMap<String, usize>,
    pub import_gate: Gate,
}

impl CountingResolver {
    pub fn imports_of(&self, url: &str) -> usize {
        self.imports.get(url).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl ModuleResolver for CountingResolver {
    async fn import(&self, url: &str) -> Result<Arc<dyn CompilerModule>, ModuleLoadError> {
        *self.imports.entry(url.to_string()).or_insert(0) += 1;
        self.import_gate.pass().await;
        match self.modules.get(url) {
            Some(module) => Ok(module.value().clone() as Arc<dyn CompilerModule>),
            None => Err(ModuleLoadError::ImportFailed {
                url: url.to_string(),
                reason: "404 Not Found".into(),
            }),
        }
    }
}

/// Registry returning a fixed document; versions given newest first.
pub struct FakeRegistry {
    versions: Mutex<Vec<String>>,
    pub fetches: AtomicUsize,
    pub unreachable: AtomicBool,
}

impl FakeRegistry {
    pub fn new(newest_first: &[&str]) -> Self {
        Self {
            versions: Mutex::new(newest_first.iter().map(|v| v.to_string()).collect()),
            fetches: AtomicUsize::new(0),
            unreachable: AtomicBool::new(false),
        }
    }

    pub fn publish(&self, version: &str) {
        self.versions.lock().insert(0, version.to_string());
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn fetch_document(&self, url: &str, _bypass_cache: bool) -> Result<Value, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(FetchError::Transport {
                url: url.to_string(),
                reason: "connection refused".into(),
            });
        }
        // Registries list versions in publish order, oldest first.
        let mut versions = Map::new();
        for version in self.versions.lock().iter().rev() {
            versions.insert(version.clone(), json!({"version": version}));
        }
        Ok(json!({"name": "@scope/compiler", "versions": versions}))
    }
}

/// A playground wired to fakes.
pub struct Harness {
    pub playground: Playground,
    pub resolver: Arc<CountingResolver>,
    pub registry: Arc<FakeRegistry>,
    pub monitor: Arc<RuntimeMonitor>,
}

impl Harness {
    /// Registry lists `newest_first`; no modules are importable until `install`ed.
    pub fn new(newest_first: &[&str]) -> Self {
        let resolver = Arc::new(CountingResolver::default());
        let registry = Arc::new(FakeRegistry::new(newest_first));
        let config = PlaygroundConfig {
            registry_url: "https://registry.test/@scope/compiler".to_string(),
            cdn_prefix: CDN_PREFIX.to_string(),
            runtime_asset: RUNTIME_ASSET.to_string(),
            lifecycle: LifecycleConfig {
                drain_timeout: Duration::from_millis(100),
            },
            ..PlaygroundConfig::default()
        };
        let playground = Playground::new(
            config,
            registry.clone(),
            resolver.clone(),
            Arc::new(MemoryStore::new()),
        );
        Self {
            playground,
            resolver,
            registry,
            monitor: Arc::new(RuntimeMonitor::default()),
        }
    }

    pub fn lifecycle(&self) -> &Arc<ModuleLifecycleManager> {
        &self.playground.lifecycle
    }

    pub fn module_url(version: &str) -> String {
        format!("{}@{}", CDN_PREFIX, version)
    }

    /// Make `version` importable.
    pub fn install(&self, version: &str) -> Arc<FakeCompiler> {
        let module = Arc::new(FakeCompiler::new(version, self.monitor.clone()));
        self.resolver.modules.insert(Self::module_url(version), module.clone());
        module
    }

    /// Store a fit verdict so switches skip the compatibility check.
    pub fn mark_fit(&self, version: &str) {
        self.playground.store.store_verdict(
            &VersionId::from(version),
            CompatibilityVerdict::uniform(CompatibilityStatus::Compatible),
        );
    }

    pub fn mark_unfit(&self, version: &str) {
        self.playground.store.store_verdict(
            &VersionId::from(version),
            CompatibilityVerdict::uniform(CompatibilityStatus::Incompatible),
        );
    }
}

pub fn v(version: &str) -> VersionId {
    VersionId::from(version)
}
