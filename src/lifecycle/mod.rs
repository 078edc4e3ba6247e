//! Compiler module lifecycle: fetch, probe, install, tear down.

mod drain;
mod error;
mod fetcher;
mod handle;
mod manager;
mod probe;

pub use drain::{DrainError, FlightGuard, FlightTracker};
pub use error::{ModuleLoadError, RuntimeInitializationError, SwitchError};
pub use fetcher::{
    FetchedModule, ModuleFetcher, ModuleResolver, RuntimeAssetLocation, StaticResolver,
    DEFAULT_CDN_PREFIX, DEFAULT_RUNTIME_ASSET,
};
pub use handle::{HandleId, ModuleHandle};
pub use manager::{
    LifecycleConfig, ModuleLifecycleManager, SwitchOutcome, SwitchPhase, SwitchReport,
    SwitchStatus,
};
pub use probe::{CompatibilityProbe, PROBE_FIXTURE};
