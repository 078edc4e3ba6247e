//! Telemetry for the playground core.
//!
//! Structured logging, switch spans, and metrics through the `metrics` facade.
//! Nothing here performs network I/O.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    init_metrics, record_catalog_lookup, record_fallback, record_probe_verdict,
    record_stale_output, record_switch_failure, record_switch_success,
};
pub use spans::{SpanExt, SwitchSpan};
