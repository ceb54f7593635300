//! Metrics collection and exposition.
//!
//! # Metrics
//! - `kv_requests_total` (counter): requests by method, status
//! - `kv_request_duration_seconds` (histogram): handler latency
//! - `kv_rate_limited_total` (counter): requests rejected by the limiter
//! - `kv_client_attempts_total` (counter): client attempts by outcome
//! - `kv_client_backoff_seconds` (histogram): delays chosen before retries
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::retries::AttemptOutcome;

/// Start the Prometheus scrape endpoint. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "kv_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("kv_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    metrics::counter!("kv_rate_limited_total").increment(1);
}

pub fn record_client_attempt(outcome: AttemptOutcome) {
    let label = match outcome {
        AttemptOutcome::Pending => "pending",
        AttemptOutcome::Success => "success",
        AttemptOutcome::RetryableFailure => "retryable",
        AttemptOutcome::TerminalFailure => "terminal",
    };
    metrics::counter!("kv_client_attempts_total", "outcome" => label).increment(1);
}

pub fn record_client_backoff(delay: Duration) {
    metrics::histogram!("kv_client_backoff_seconds").record(delay.as_secs_f64());
}
