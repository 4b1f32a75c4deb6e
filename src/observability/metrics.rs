//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, reloads, OCSP, sessions, tokens)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, outcome
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_route_reloads_total` (counter): reloads by result
//! - `gateway_ocsp_lookups_total` (counter): probe results (hit, miss, error)
//! - `gateway_ocsp_cache_entries` (gauge)
//! - `gateway_tls_sessions_total` (counter): store events (put, hit, miss, evict)
//! - `gateway_tls_session_entries` (gauge)
//! - `gateway_tokens_issued_total` (counter)
//! - `gateway_auth_failures_total` (counter): failures by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, outcome: &'static str, started: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_route_reload(result: &'static str) {
    metrics::counter!("gateway_route_reloads_total", "result" => result).increment(1);
}

pub fn record_ocsp_lookup(result: &'static str) {
    metrics::counter!("gateway_ocsp_lookups_total", "result" => result).increment(1);
}

pub fn record_ocsp_cache_size(entries: usize) {
    metrics::gauge!("gateway_ocsp_cache_entries").set(entries as f64);
}

pub fn record_session_event(event: &'static str) {
    metrics::counter!("gateway_tls_sessions_total", "event" => event).increment(1);
}

pub fn record_session_store_size(entries: usize) {
    metrics::gauge!("gateway_tls_session_entries").set(entries as f64);
}

pub fn record_token_issued() {
    metrics::counter!("gateway_tokens_issued_total").increment(1);
}

pub fn record_auth_failure(reason: &'static str) {
    metrics::counter!("gateway_auth_failures_total", "reason" => reason).increment(1);
}
