//! Smoke tests run against a freshly fetched module before it is trusted.
//!
//! The battery is deliberately shallow: it only has to tell whether a version
//! is safe to use or should be fallen back away from.

use tracing::{debug, warn};

use super::fetcher::{initialize_with_fallback, RuntimeAssetLocation};
use crate::compiler::{
    guarded, Capability, CompilerModule, ConvertOptions, ParseOptions, TransformOptions,
};
use crate::storage::{CompatibilityStatus, CompatibilityVerdict};
use crate::telemetry;

/// Minimal source every compiler version must handle.
pub const PROBE_FIXTURE: &str = "<div>Hello World</div>";

/// Transform output must keep the fixture's text.
const TRANSFORM_MARKER: &str = "Hello World";

/// Alternate-syntax output must embed an inline source map.
const SOURCE_MAP_MARKER: &str = "sourceMappingURL=data:application/json;";

/// Runs the fixed smoke-test table against a module.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompatibilityProbe;

impl CompatibilityProbe {
    pub fn new() -> Self {
        Self
    }

    /// Classify every capability of `module`.
    ///
    /// Leaves the module torn down whatever the outcome.
    pub async fn probe(&self, module: &dyn CompilerModule, assets: &RuntimeAssetLocation) -> CompatibilityVerdict {
        if let Err(failure) = initialize_with_fallback(module, assets).await {
            warn!(
                primary = %failure.primary,
                fallback = %failure.fallback,
                "Probe could not initialize runtime; marking all capabilities incompatible"
            );
            telemetry::record_probe_verdict(false);
            return CompatibilityVerdict::uniform(CompatibilityStatus::Incompatible);
        }

        let mut verdict = CompatibilityVerdict::new();
        for capability in Capability::ALL {
            let status = if run_smoke_test(module, capability).await {
                CompatibilityStatus::Compatible
            } else {
                CompatibilityStatus::Incompatible
            };
            debug!(capability = %capability, ?status, "Smoke test finished");
            verdict.set(capability, status);
        }

        if let Err(e) = guarded(module.teardown_runtime()).await {
            warn!(error = %e, "Teardown after probe failed");
        }

        telemetry::record_probe_verdict(verdict.is_fit());
        verdict
    }
}

/// True only if the call completes and its assertion holds.
async fn run_smoke_test(module: &dyn CompilerModule, capability: Capability) -> bool {
    let result = match capability {
        Capability::Parse => guarded(module.parse(PROBE_FIXTURE, &ParseOptions::default()))
            .await
            .map(|out| out.diagnostics().is_some()),
        Capability::Transform => guarded(module.transform(PROBE_FIXTURE, &TransformOptions::default()))
            .await
            .map(|out| out.code().is_some_and(|code| code.contains(TRANSFORM_MARKER))),
        Capability::ConvertToAlternateSyntax => {
            guarded(module.convert_to_alternate_syntax(PROBE_FIXTURE, &ConvertOptions::default()))
                .await
                .map(|out| out.code().is_some_and(|code| code.contains(SOURCE_MAP_MARKER)))
        }
    };

    match result {
        Ok(passed) => passed,
        Err(e) => {
            debug!(capability = %capability, error = %e, "Smoke test raised");
            false
        }
    }
}
