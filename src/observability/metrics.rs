//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gate_requests_total` (counter): requests by method, status
//! - `gate_request_duration_seconds` (histogram): latency by method
//! - `gate_admissions_total` (counter): admission decisions by route, outcome
//! - `gate_rate_limited_total` (counter): denials by route
//! - `gate_limiter_entries` (gauge): live limiter buckets
//! - `gate_limiter_evictions_total` (counter): buckets removed by the sweep
//! - `gate_auth_failures_total` (counter): refusals by internal reason
//! - `gate_session_events_total` (counter): session lifecycle operations
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "gate_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gate_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_admission(route: &str, outcome: &'static str) {
    counter!("gate_admissions_total", "route" => route.to_string(), "outcome" => outcome)
        .increment(1);
}

pub fn record_rate_limited(route: &str) {
    counter!("gate_rate_limited_total", "route" => route.to_string()).increment(1);
}

pub fn record_limiter_created() {
    gauge!("gate_limiter_entries").increment(1.0);
}

/// Called after each sweep with the number removed and the number left.
pub fn record_limiter_evictions(evicted: u64, remaining: usize) {
    counter!("gate_limiter_evictions_total").increment(evicted);
    gauge!("gate_limiter_entries").set(remaining as f64);
}

pub fn record_auth_failure(reason: &'static str) {
    counter!("gate_auth_failures_total", "reason" => reason).increment(1);
}

pub fn record_session_event(op: &'static str) {
    counter!("gate_session_events_total", "op" => op).increment(1);
}
