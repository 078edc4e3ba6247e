//! Handles to installed compiler module instances.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::fetcher::{FetchedModule, RuntimeAssetLocation};
use crate::compiler::CompilerModule;
use crate::versions::VersionId;

/// Unique id of one installation of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandleId(u64);

impl HandleId {
    pub fn id(&self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An installed compiler module.
///
/// The same fetched module may be installed several times over a session;
/// each installation gets a fresh id so outputs can be attributed exactly.
#[derive(Clone)]
pub struct ModuleHandle {
    id: HandleId,
    version: VersionId,
    module: Arc<dyn CompilerModule>,
    assets: RuntimeAssetLocation,
}

impl ModuleHandle {
    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn version(&self) -> &VersionId {
        &self.version
    }

    pub fn assets(&self) -> &RuntimeAssetLocation {
        &self.assets
    }

    pub(crate) fn module(&self) -> &Arc<dyn CompilerModule> {
        &self.module
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("assets", &self.assets)
            .finish_non_exhaustive()
    }
}

/// Hands out monotonically increasing handle ids.
pub(crate) struct HandleAllocator {
    next_id: AtomicU64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1) }
    }

    pub fn allocate(&self, fetched: FetchedModule) -> ModuleHandle {
        let id = HandleId(self.next_id.fetch_add(1, Ordering::SeqCst));
        ModuleHandle {
            id,
            version: fetched.version,
            module: fetched.module,
            assets: fetched.assets,
        }
    }
}
