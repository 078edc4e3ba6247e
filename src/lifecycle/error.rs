//! Failure taxonomy for compiler version switches.

use thiserror::Error;

use crate::compiler::{Capability, ModuleError};
use crate::storage::CompatibilityStatus;
use crate::versions::VersionId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleLoadError {
    #[error("Invalid compiler version identifier: {0:?}")]
    InvalidVersion(String),

    #[error("Failed to import compiler module from {url}: {reason}")]
    ImportFailed { url: String, reason: String },
}

/// Both runtime asset URLs failed to initialize.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Compiler {version} runtime failed to initialize from {primary_url} ({primary}) and {fallback_url} ({fallback})"
)]
pub struct RuntimeInitializationError {
    pub version: VersionId,
    pub primary_url: String,
    pub primary: ModuleError,
    pub fallback_url: String,
    pub fallback: ModuleError,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwitchError {
    #[error("Failed to load compiler {version}: {source}")]
    Load {
        version: VersionId,
        #[source]
        source: ModuleLoadError,
    },

    #[error("Compiler {version} is not usable: {}", describe_unfit(.unfit))]
    Incompatible {
        version: VersionId,
        unfit: Vec<(Capability, CompatibilityStatus)>,
    },

    #[error(transparent)]
    RuntimeInitialization(#[from] RuntimeInitializationError),

    #[error("Switch to {version} superseded by a newer request")]
    Superseded { version: VersionId },
}

impl SwitchError {
    /// Version the failed attempt targeted.
    pub fn version(&self) -> &VersionId {
        match self {
            Self::Load { version, .. }
            | Self::Incompatible { version, .. }
            | Self::Superseded { version } => version,
            Self::RuntimeInitialization(e) => &e.version,
        }
    }

    /// The requested version itself is at fault: it could not be fetched or is unfit.
    ///
    /// Fallback answers these and runtime-initialization failures alike.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Incompatible { .. })
    }

    /// Asset hosting failures; not expected to heal by switching versions.
    pub fn requires_escalation(&self) -> bool {
        matches!(self, Self::RuntimeInitialization(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Load { .. } => "load",
            Self::Incompatible { .. } => "incompatible",
            Self::RuntimeInitialization(_) => "runtime_init",
            Self::Superseded { .. } => "superseded",
        }
    }
}

fn describe_unfit(unfit: &[(Capability, CompatibilityStatus)]) -> String {
    unfit
        .iter()
        .map(|(capability, status)| format!("{} is {:?}", capability, status))
        .collect::<Vec<_>>()
        .join(", ")
}
