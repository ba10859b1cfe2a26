//! Metrics collection.
//!
//! # Responsibilities
//! - Define engine metrics (requests, latency, pool activity, redirects)
//! - Record through the `metrics` facade; the embedding application
//!   installs whatever recorder it wants
//!
//! # Metrics
//! - `rawhttp_requests_total` (counter): completed exchanges by method, status
//! - `rawhttp_request_duration_seconds` (histogram): `send` latency
//! - `rawhttp_pool_events_total` (counter): pool activity by event
//! - `rawhttp_redirects_total` (counter): redirects followed
//! - `rawhttp_decompression_failures_total` (counter): by encoding
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op
//! - Labels stay low-cardinality (no hosts or URLs)

use std::time::Instant;

/// Pool activity worth counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEvent {
    /// An idle connection was handed to an exchange.
    Reused,
    /// A new connection was opened.
    Opened,
    /// A connection went back into the pool.
    Released,
    /// An idle connection failed validation and was closed.
    Evicted,
    /// A connection was closed instead of pooled.
    Discarded,
}

impl PoolEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolEvent::Reused => "reused",
            PoolEvent::Opened => "opened",
            PoolEvent::Released => "released",
            PoolEvent::Evicted => "evicted",
            PoolEvent::Discarded => "discarded",
        }
    }
}

/// Record a finished exchange.
pub fn record_exchange(method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "rawhttp_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("rawhttp_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_pool_event(event: PoolEvent) {
    metrics::counter!("rawhttp_pool_events_total", "event" => event.as_str()).increment(1);
}

pub fn record_redirect() {
    metrics::counter!("rawhttp_redirects_total").increment(1);
}

pub fn record_decompression_failure(encoding: &str) {
    metrics::counter!("rawhttp_decompression_failures_total", "encoding" => encoding.to_string())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_exchange("GET", 200, Instant::now());
        record_pool_event(PoolEvent::Reused);
        record_redirect();
        record_decompression_failure("gzip");
        assert_eq!(PoolEvent::Evicted.as_str(), "evicted");
    }
}
