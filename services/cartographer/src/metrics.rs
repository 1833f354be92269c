//! Prometheus metrics exposition
//!
//! The library crates emit through the `metrics` facade:
//!
//! - `capture_calls_total`, `capture_gaps_total` (interceptor)
//! - `login_attempts_total` (label `outcome`)
//! - `probe_requests_total` (label `result`)
//! - `session_refresh_total` (label `outcome`)
//!
//! This module adds the service's own series and installs the recorder.
//! `serve` renders it on `GET /metrics`; `discover` logs the samples once
//! the run ends.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a finished discovery run.
pub fn record_discovery(outcome: &'static str, endpoints: usize) {
    metrics::counter!("discovery_runs_total", "outcome" => outcome).increment(1);
    if outcome == "success" {
        metrics::gauge!("catalog_endpoints").set(endpoints as f64);
    }
}

/// Sample lines of the current exposition, without `#` comments.
pub fn samples(handle: &PrometheusHandle) -> Vec<String> {
    handle
        .render()
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Record a `POST /refresh` result.
pub fn record_refresh_request(status: u16) {
    metrics::counter!("refresh_requests_total", "status" => status.to_string()).increment(1);
}
