//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with SLO-aligned histograms
//! and standardized naming conventions.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Parley metrics
pub const METRICS_PREFIX: &str = "parley";

/// SLO-aligned histogram buckets for request latency (in seconds)
/// Targets: P50 < 50ms, P99 < 150ms
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001,  // 1ms
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms - P50 target
    0.075,  // 75ms
    0.100,  // 100ms
    0.150,  // 150ms - P99 target
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for responder latency (generative backends are slower)
pub const RESPONDER_BUCKETS: &[f64] = &[
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Admission metrics
    describe_counter!(
        format!("{}_sessions_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total session admission outcomes"
    );

    describe_counter!(
        format!("{}_queue_promotions_total", METRICS_PREFIX),
        Unit::Count,
        "Total queued sessions promoted to active"
    );

    describe_counter!(
        format!("{}_sessions_reclaimed_total", METRICS_PREFIX),
        Unit::Count,
        "Total sessions reclaimed by the reaper"
    );

    describe_gauge!(
        format!("{}_sessions_active", METRICS_PREFIX),
        Unit::Count,
        "Sessions currently holding an active slot"
    );

    describe_gauge!(
        format!("{}_queue_depth", METRICS_PREFIX),
        Unit::Count,
        "Sessions currently waiting in the queue"
    );

    // Responder metrics
    describe_counter!(
        format!("{}_responder_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total responder backend requests"
    );

    describe_histogram!(
        format!("{}_responder_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Responder backend latency in seconds"
    );

    describe_counter!(
        format!("{}_responder_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total responder backend errors"
    );

    // Database metrics
    describe_histogram!(
        format!("{}_db_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Database query latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record an admission outcome (active, queued, pending, rejected)
pub fn record_admission(outcome: &str) {
    counter!(
        format!("{}_sessions_created_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record queued sessions promoted to active
pub fn record_promotions(count: u64) {
    counter!(format!("{}_queue_promotions_total", METRICS_PREFIX)).increment(count);
}

/// Record sessions reclaimed by the reaper, by rule
pub fn record_reclaimed(reason: &str, count: u64) {
    counter!(
        format!("{}_sessions_reclaimed_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(count);
}

/// Refresh the occupancy gauges after a reconciler pass
pub fn set_session_gauges(active: u64, queued: u64) {
    gauge!(format!("{}_sessions_active", METRICS_PREFIX)).set(active as f64);
    gauge!(format!("{}_queue_depth", METRICS_PREFIX)).set(queued as f64);
}

/// Record a responder backend call
pub fn record_responder(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_responder_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_responder_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_responder_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets() {
        // Verify buckets are sorted and contain SLO targets
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }

        // P50 target (50ms) should be in buckets
        assert!(LATENCY_BUCKETS.contains(&0.050));
        // P99 target (150ms) should be in buckets
        assert!(LATENCY_BUCKETS.contains(&0.150));
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/v1/sessions");
        std::thread::sleep(std::time::Duration::from_millis(10));
        metrics.finish(201);
        // Just verify it runs without panic
    }
}
