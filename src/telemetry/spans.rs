//! Span utilities for version switches.

use std::fmt::Display;

use tokio::time::Instant;
use tracing::{field, info_span, Span};

/// Fills the empty fields of a `compiler_switch` span once the attempt settles.
pub trait SpanExt {
    /// `status` becomes `ok`, or the label `kind` gives the error, and
    /// `error.message` carries the error text.
    fn record_outcome<T, E, F>(&self, result: &Result<T, E>, kind: F)
    where
        E: Display,
        F: Fn(&E) -> &'static str;

    /// Record milliseconds since `started` as `latency_ms` and return them.
    fn record_latency(&self, started: Instant) -> u64;
}

impl SpanExt for Span {
    fn record_outcome<T, E, F>(&self, result: &Result<T, E>, kind: F)
    where
        E: Display,
        F: Fn(&E) -> &'static str,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", kind(e));
                self.record("error.message", field::display(e));
            }
        }
    }

    fn record_latency(&self, started: Instant) -> u64 {
        let latency_ms = started.elapsed().as_millis() as u64;
        self.record("latency_ms", latency_ms);
        latency_ms
    }
}

/// Factory for `compiler_switch` spans.
pub struct SwitchSpan;

impl SwitchSpan {
    /// `request_id` is shared by a request and its fallback hop. `handle` and
    /// `probed` are recorded by the manager when a module is installed.
    pub fn new(request_id: &str, version: &str) -> Span {
        info_span!(
            "compiler_switch",
            request_id = %request_id,
            version = %version,
            handle = field::Empty,
            probed = field::Empty,
            status = field::Empty,
            error.message = field::Empty,
            latency_ms = field::Empty,
        )
    }
}
