//! Counters and histograms for the module lifecycle.

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Register metric descriptions. Safe to call more than once.
pub fn init_metrics() {
    describe_counter!("playground_switch_total", "Version switches by result");
    describe_histogram!("playground_switch_latency_ms", "Latency of successful switches");
    describe_counter!("playground_fallback_total", "Fallback outcomes");
    describe_counter!("playground_probe_total", "Compatibility probes by verdict");
    describe_counter!("playground_catalog_lookup_total", "Catalog lookups by cache result");
    describe_counter!("playground_stale_output_total", "Outputs discarded after a module swap");
}

pub fn record_switch_success(probed: bool, latency_ms: u64) {
    counter!("playground_switch_total", "result" => "success", "probed" => probed.to_string())
        .increment(1);
    histogram!("playground_switch_latency_ms").record(latency_ms as f64);
}

pub fn record_switch_failure(kind: &'static str) {
    counter!("playground_switch_total", "result" => kind).increment(1);
}

pub fn record_fallback(outcome: &'static str) {
    counter!("playground_fallback_total", "outcome" => outcome).increment(1);
}

pub fn record_probe_verdict(fit: bool) {
    let verdict = if fit { "fit" } else { "unfit" };
    counter!("playground_probe_total", "verdict" => verdict).increment(1);
}

pub fn record_catalog_lookup(cache_hit: bool) {
    let result = if cache_hit { "hit" } else { "miss" };
    counter!("playground_catalog_lookup_total", "cache" => result).increment(1);
}

pub fn record_stale_output(capability: &'static str) {
    counter!("playground_stale_output_total", "capability" => capability).increment(1);
}
