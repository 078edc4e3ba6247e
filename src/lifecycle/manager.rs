//! Compiler version switching.
//!
//! Orchestrates fetch, probe, validation, teardown, install and runtime
//! initialization for one active module at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::error::{RuntimeInitializationError, SwitchError};
use super::fetcher::{initialize_with_fallback, InitFailure, ModuleFetcher};
use super::handle::{HandleAllocator, HandleId, ModuleHandle};
use super::probe::CompatibilityProbe;
use crate::compiler::guarded;
use crate::output::OutputLayer;
use crate::storage::{CompatibilityStore, VerdictLookup};
use crate::telemetry::{self, SpanExt, SwitchSpan};
use crate::versions::{FetchError, VersionCatalog, VersionId, VersionsView};

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// How long teardown waits for computations still running on the old handle.
    pub drain_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchPhase {
    Fetching,
    Probing,
    Validating,
    TearingDownPrevious,
    Installing,
    InitializingRuntime,
    FallingBack,
}

/// Published on every transition for loading indicators and notices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchStatus {
    Idle,
    Switching { version: VersionId, phase: SwitchPhase },
    Active { version: VersionId },
    FellBack { requested: VersionId, fallback: VersionId },
    Failed { requested: VersionId, reason: String, reload_required: bool },
}

impl SwitchStatus {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Switching { .. })
    }

    /// User-facing notice, if the status warrants one.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Idle | Self::Active { .. } => None,
            Self::Switching { version, .. } => Some(format!("Loading compiler {}", version)),
            Self::FellBack { requested, fallback } => Some(format!(
                "Compiler {} could not be loaded, using {} instead",
                requested, fallback
            )),
            Self::Failed { requested, reload_required: true, .. } => Some(format!(
                "Compiler {} could not be loaded and no fallback worked. Please reload the page.",
                requested
            )),
            Self::Failed { requested, reason, .. } => {
                Some(format!("Compiler {} could not be loaded: {}", requested, reason))
            }
        }
    }
}

/// A completed switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchReport {
    pub version: VersionId,
    pub handle: HandleId,
    /// The verdict was produced by this switch rather than read from storage.
    pub probed: bool,
    /// Runtime asset URL that initialized successfully.
    pub asset_url: String,
}

/// Result of `switch_with_fallback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchOutcome {
    Activated(SwitchReport),
    FellBack {
        requested: VersionId,
        cause: SwitchError,
        report: SwitchReport,
    },
    Failed {
        requested: VersionId,
        cause: SwitchError,
        fallback: Option<(VersionId, SwitchError)>,
    },
    /// A newer request took over before this one settled.
    Superseded { requested: VersionId },
}

impl SwitchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Activated(_) | Self::FellBack { .. })
    }

    /// Version left active by this request, if any.
    pub fn active_version(&self) -> Option<&VersionId> {
        match self {
            Self::Activated(report) | Self::FellBack { report, .. } => Some(&report.version),
            Self::Failed { .. } | Self::Superseded { .. } => None,
        }
    }

    pub fn requires_reload(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

struct ActiveModule {
    handle: ModuleHandle,
    initialized: bool,
}

/// Owns the single active compiler module.
///
/// Switches are serialized; a request overtaken by a newer one while queued
/// reports `Superseded` instead of touching the active module.
pub struct ModuleLifecycleManager {
    fetcher: ModuleFetcher,
    probe: CompatibilityProbe,
    store: Arc<CompatibilityStore>,
    catalog: Arc<VersionCatalog>,
    outputs: Arc<OutputLayer>,
    config: LifecycleConfig,
    switch_lock: Mutex<()>,
    active: RwLock<Option<ActiveModule>>,
    latest_ticket: AtomicU64,
    handles: HandleAllocator,
    status: watch::Sender<SwitchStatus>,
}

impl ModuleLifecycleManager {
    pub fn new(
        fetcher: ModuleFetcher,
        store: Arc<CompatibilityStore>,
        catalog: Arc<VersionCatalog>,
        outputs: Arc<OutputLayer>,
        config: LifecycleConfig,
    ) -> Self {
        let (status, _) = watch::channel(SwitchStatus::Idle);
        Self {
            fetcher,
            probe: CompatibilityProbe::new(),
            store,
            catalog,
            outputs,
            config,
            switch_lock: Mutex::new(()),
            active: RwLock::new(None),
            latest_ticket: AtomicU64::new(0),
            handles: HandleAllocator::new(),
            status,
        }
    }

    pub fn fetcher(&self) -> &ModuleFetcher {
        &self.fetcher
    }

    pub fn store(&self) -> &Arc<CompatibilityStore> {
        &self.store
    }

    pub fn catalog(&self) -> &Arc<VersionCatalog> {
        &self.catalog
    }

    pub fn outputs(&self) -> &Arc<OutputLayer> {
        &self.outputs
    }

    pub fn status(&self) -> SwitchStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SwitchStatus> {
        self.status.subscribe()
    }

    /// Version of the installed and initialized module.
    pub async fn active_version(&self) -> Option<VersionId> {
        self.active
            .read()
            .await
            .as_ref()
            .filter(|a| a.initialized)
            .map(|a| a.handle.version().clone())
    }

    /// Installed handle, initialized or not.
    pub async fn active_handle(&self) -> Option<ModuleHandle> {
        self.active.read().await.as_ref().map(|a| a.handle.clone())
    }

    pub async fn is_runtime_initialized(&self) -> bool {
        self.active.read().await.as_ref().is_some_and(|a| a.initialized)
    }

    /// Switch to `version` without falling back.
    pub async fn switch_to(&self, version: &VersionId) -> Result<SwitchReport, SwitchError> {
        let ticket = self.issue_ticket();
        let request_id = Uuid::new_v4().to_string();
        let result = self.attempt(version, ticket, &request_id).await;

        match &result {
            Ok(report) => self.publish(SwitchStatus::Active { version: report.version.clone() }),
            Err(SwitchError::Superseded { .. }) => {}
            Err(e) => self.publish(SwitchStatus::Failed {
                requested: version.clone(),
                reason: e.to_string(),
                reload_required: e.requires_escalation(),
            }),
        }
        result
    }

    /// Switch to `requested`; on failure make exactly one attempt at a fallback version.
    pub async fn switch_with_fallback(&self, requested: &VersionId) -> SwitchOutcome {
        let ticket = self.issue_ticket();
        let request_id = Uuid::new_v4().to_string();

        let cause = match self.attempt(requested, ticket, &request_id).await {
            Ok(report) => {
                self.publish(SwitchStatus::Active { version: report.version.clone() });
                return SwitchOutcome::Activated(report);
            }
            Err(SwitchError::Superseded { .. }) => {
                return SwitchOutcome::Superseded { requested: requested.clone() };
            }
            Err(cause) => cause,
        };

        let Some(candidate) = self.fallback_candidate(requested).await else {
            telemetry::record_fallback("unavailable");
            error!(
                request_id = %request_id,
                requested = %requested,
                error = %cause,
                "No fallback compiler available"
            );
            self.publish(SwitchStatus::Failed {
                requested: requested.clone(),
                reason: cause.to_string(),
                reload_required: true,
            });
            return SwitchOutcome::Failed {
                requested: requested.clone(),
                cause,
                fallback: None,
            };
        };

        warn!(
            request_id = %request_id,
            requested = %requested,
            fallback = %candidate,
            error = %cause,
            version_fault = cause.is_soft(),
            "Falling back to another compiler version"
        );
        self.publish(SwitchStatus::Switching {
            version: candidate.clone(),
            phase: SwitchPhase::FallingBack,
        });

        match self.attempt(&candidate, ticket, &request_id).await {
            Ok(report) => {
                telemetry::record_fallback("recovered");
                self.publish(SwitchStatus::FellBack {
                    requested: requested.clone(),
                    fallback: report.version.clone(),
                });
                SwitchOutcome::FellBack {
                    requested: requested.clone(),
                    cause,
                    report,
                }
            }
            Err(SwitchError::Superseded { .. }) => SwitchOutcome::Superseded {
                requested: requested.clone(),
            },
            Err(fallback_error) => {
                telemetry::record_fallback("failed");
                error!(
                    request_id = %request_id,
                    requested = %requested,
                    fallback = %candidate,
                    error = %fallback_error,
                    "Fallback compiler failed too"
                );
                self.publish(SwitchStatus::Failed {
                    requested: requested.clone(),
                    reason: cause.to_string(),
                    reload_required: true,
                });
                SwitchOutcome::Failed {
                    requested: requested.clone(),
                    cause,
                    fallback: Some((candidate, fallback_error)),
                }
            }
        }
    }

    /// Last-used version if it is another version with a fit stored verdict,
    /// else the newest production version unless that is the one that failed.
    pub async fn fallback_candidate(&self, failed: &VersionId) -> Option<VersionId> {
        if let Some(last_used) = self.store.last_used_version() {
            if &last_used != failed && self.store.get_verdict(&last_used).is_verified_fit() {
                return Some(last_used);
            }
        }

        match self.catalog.partitioned(false).await {
            Ok(partition) => VersionsView::new(partition)
                .newest_production()
                .filter(|latest| *latest != failed)
                .cloned(),
            Err(e) => {
                warn!(error = %e, "Could not look up newest production compiler for fallback");
                None
            }
        }
    }

    /// Version to load on startup.
    pub async fn default_version(&self) -> Result<VersionId, FetchError> {
        if let Some(last_used) = self.store.last_used_version() {
            if self.store.get_verdict(&last_used).is_verified_fit() {
                return Ok(last_used);
            }
            debug!(version = %last_used, "Last used compiler has no fit verdict; using newest production");
        }
        self.catalog.latest_production().await
    }

    /// Load the default version.
    pub async fn start(&self) -> Result<SwitchOutcome, FetchError> {
        let version = self.default_version().await?;
        info!(version = %version, "Starting with compiler");
        Ok(self.switch_with_fallback(&version).await)
    }

    /// Tear down the active module. Queued switches are superseded.
    pub async fn shutdown(&self) {
        self.issue_ticket();
        let _serial = self.switch_lock.lock().await;

        let previous = self.active.write().await.take();
        if let Some(previous) = previous {
            self.retire(previous).await;
        }
        self.publish(SwitchStatus::Idle);
        info!("Compiler lifecycle shut down");
    }

    fn issue_ticket(&self) -> u64 {
        self.latest_ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn checkpoint(&self, version: &VersionId, ticket: u64) -> Result<(), SwitchError> {
        if ticket < self.latest_ticket.load(Ordering::SeqCst) {
            return Err(SwitchError::Superseded { version: version.clone() });
        }
        Ok(())
    }

    fn publish(&self, status: SwitchStatus) {
        self.status.send_replace(status);
    }

    fn enter_phase(&self, version: &VersionId, phase: SwitchPhase) {
        debug!(version = %version, ?phase, "Switch phase");
        self.publish(SwitchStatus::Switching { version: version.clone(), phase });
    }

    /// One serialized switch attempt inside its own span.
    async fn attempt(
        &self,
        version: &VersionId,
        ticket: u64,
        request_id: &str,
    ) -> Result<SwitchReport, SwitchError> {
        let span = SwitchSpan::new(request_id, version.as_str());
        let _serial = self.switch_lock.lock().await;

        let started = Instant::now();
        let result = self.run_switch(version, ticket).instrument(span.clone()).await;
        let latency_ms = span.record_latency(started);

        span.record_outcome(&result, SwitchError::kind);
        if let Ok(report) = &result {
            span.record("handle", report.handle.id());
            span.record("probed", report.probed);
        }
        span.in_scope(|| match &result {
            Ok(report) => {
                telemetry::record_switch_success(report.probed, latency_ms);
                info!(handle = %report.handle, asset = %report.asset_url, "Compiler switch complete");
            }
            Err(e @ SwitchError::Superseded { .. }) => {
                telemetry::record_switch_failure(e.kind());
                debug!("Compiler switch superseded");
            }
            Err(e) if e.requires_escalation() => {
                telemetry::record_switch_failure(e.kind());
                error!(escalate = true, error = %e, "Compiler runtime could not be initialized from any asset URL");
            }
            Err(e) => {
                telemetry::record_switch_failure(e.kind());
                warn!(error = %e, "Compiler switch failed");
            }
        });
        result
    }

    async fn run_switch(&self, version: &VersionId, ticket: u64) -> Result<SwitchReport, SwitchError> {
        self.checkpoint(version, ticket)?;

        self.enter_phase(version, SwitchPhase::Fetching);
        let fetched = self
            .fetcher
            .fetch(version)
            .await
            .map_err(|source| SwitchError::Load { version: version.clone(), source })?;
        // A newer request may have arrived during the import; do not disturb the active module.
        self.checkpoint(version, ticket)?;

        let (verdict, probed, suspended) = match self.store.get_verdict(version) {
            VerdictLookup::Verified(record) => {
                debug!(version = %version, "Using stored compatibility verdict");
                (record.compatibility_map, false, false)
            }
            VerdictLookup::Unknown => {
                self.enter_phase(version, SwitchPhase::Probing);
                // The probe initializes a runtime; the active one must be down first.
                let suspended = self.suspend_active().await;
                let verdict = self.probe.probe(fetched.module.as_ref(), &fetched.assets).await;
                self.store.store_verdict(version, verdict.clone());
                (verdict, true, suspended)
            }
        };

        self.enter_phase(version, SwitchPhase::Validating);
        let admitted = if verdict.is_fit() {
            self.checkpoint(version, ticket)
        } else {
            Err(SwitchError::Incompatible {
                version: version.clone(),
                unfit: verdict.unfit(),
            })
        };
        if let Err(e) = admitted {
            if suspended {
                if let Err(resume_error) = self.resume_active(ticket).await {
                    // Nothing is running now; a queued newer switch will install its own module.
                    if !matches!(e, SwitchError::Superseded { .. }) {
                        return Err(resume_error);
                    }
                }
            }
            return Err(e);
        }

        self.enter_phase(version, SwitchPhase::TearingDownPrevious);
        let mut active = self.active.write().await;
        if let Some(previous) = active.take() {
            self.retire(previous).await;
        }

        self.enter_phase(version, SwitchPhase::Installing);
        let handle = self.handles.allocate(fetched);
        *active = Some(ActiveModule {
            handle: handle.clone(),
            initialized: false,
        });

        self.enter_phase(version, SwitchPhase::InitializingRuntime);
        let asset_url = match initialize_with_fallback(handle.module().as_ref(), handle.assets()).await {
            Ok(url) => url.to_string(),
            Err(failure) => return Err(runtime_init_error(&handle, failure)),
        };
        if let Some(current) = active.as_mut() {
            current.initialized = true;
        }
        drop(active);

        self.store.set_last_used_version(version);
        self.outputs.rebind(handle.clone(), ticket).await;

        Ok(SwitchReport {
            version: version.clone(),
            handle: handle.id(),
            probed,
            asset_url,
        })
    }

    /// Unbind outputs, drain, and tear down a handle leaving the active slot.
    async fn retire(&self, previous: ActiveModule) {
        self.outputs.unbind();
        let id = previous.handle.id();

        if previous.initialized {
            self.tear_down(&previous.handle).await;
        }
        self.outputs.flights().remove(id);
    }

    async fn tear_down(&self, handle: &ModuleHandle) {
        if let Err(e) = self.outputs.flights().drain(handle.id(), self.config.drain_timeout).await {
            warn!(handle = %handle.id(), error = %e, "Tearing down with computations still running");
        }
        match guarded(handle.module().teardown_runtime()).await {
            Ok(()) => info!(handle = %handle.id(), version = %handle.version(), "Tore down compiler runtime"),
            Err(e) => warn!(handle = %handle.id(), version = %handle.version(), error = %e, "Compiler teardown failed"),
        }
    }

    /// Tear down the active runtime but keep its handle installed.
    async fn suspend_active(&self) -> bool {
        let mut active = self.active.write().await;
        let Some(current) = active.as_mut().filter(|a| a.initialized) else {
            return false;
        };

        self.outputs.unbind();
        self.tear_down(&current.handle).await;
        current.initialized = false;
        true
    }

    /// Bring a suspended handle back after a rejected switch.
    ///
    /// On failure the handle stays installed but uninitialized.
    async fn resume_active(&self, ticket: u64) -> Result<(), SwitchError> {
        let mut active = self.active.write().await;
        let Some(current) = active.as_mut() else {
            return Ok(());
        };

        let resumed = initialize_with_fallback(current.handle.module().as_ref(), current.handle.assets())
            .await
            .map(str::to_string);
        match resumed {
            Ok(url) => {
                debug!(handle = %current.handle.id(), asset = %url, "Resumed previous compiler");
                current.initialized = true;
                let handle = current.handle.clone();
                drop(active);
                self.outputs.rebind(handle, ticket).await;
                Ok(())
            }
            Err(failure) => {
                error!(
                    escalate = true,
                    handle = %current.handle.id(),
                    version = %current.handle.version(),
                    primary = %failure.primary,
                    fallback = %failure.fallback,
                    "Previous compiler could not be resumed"
                );
                Err(runtime_init_error(&current.handle, failure))
            }
        }
    }
}

fn runtime_init_error(handle: &ModuleHandle, failure: InitFailure) -> SwitchError {
    RuntimeInitializationError {
        version: handle.version().clone(),
        primary_url: handle.assets().primary.clone(),
        primary: failure.primary,
        fallback_url: handle.assets().fallback.clone(),
        fallback: failure.fallback,
    }
    .into()
}
