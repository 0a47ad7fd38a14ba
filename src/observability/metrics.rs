//! Metrics collection and exposition.
//!
//! # Metrics
//! - `client_requests_total` (counter): calls by method, status
//! - `client_request_duration_seconds` (histogram): latency below tracing
//! - `client_retries_total` (counter): scheduled retries by method, reason
//! - `client_retries_exhausted_total` (counter): retryable outcomes returned
//!   after the last retry
//! - `rate_limiter_decisions_total` (counter): admissions by strategy, outcome
//! - `rate_limiter_in_flight` (gauge): callers holding a concurrency slot
//! - `rate_limiter_window_buckets` (gauge): retained window buckets
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels are low-cardinality only: no targets, no request ids

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and serve scrapes on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: &str, elapsed: Duration) {
    metrics::counter!(
        "client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("client_request_duration_seconds", "method" => method.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_retry(method: &str, reason: &str) {
    metrics::counter!(
        "client_retries_total",
        "method" => method.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn record_retries_exhausted(method: &str) {
    metrics::counter!("client_retries_exhausted_total", "method" => method.to_string())
        .increment(1);
}

pub fn record_rate_limit_decision(strategy: &'static str, granted: bool) {
    let outcome = if granted { "granted" } else { "denied" };
    metrics::counter!(
        "rate_limiter_decisions_total",
        "strategy" => strategy,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_in_flight(strategy: &'static str, in_flight: usize) {
    metrics::gauge!("rate_limiter_in_flight", "strategy" => strategy).set(in_flight as f64);
}

pub fn record_window_buckets(strategy: &'static str, buckets: usize) {
    metrics::gauge!("rate_limiter_window_buckets", "strategy" => strategy).set(buckets as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_request("GET", "200", Duration::from_millis(5));
        record_retry("GET", "503");
        record_retries_exhausted("GET");
        record_rate_limit_decision("token_bucket", false);
        record_in_flight("token_bucket", 3);
        record_window_buckets("sliding_window", 60);
    }
}
