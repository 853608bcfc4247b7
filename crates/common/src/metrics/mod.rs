//! Metrics and observability utilities
//!
//! Provides metric descriptions and recording helpers over the `metrics`
//! facade. No exporter is installed here; the embedding binary decides.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all LexForge metrics
pub const METRICS_PREFIX: &str = "lexforge";

/// Histogram buckets for retrieval latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.010,  // 10ms
    0.025,  // 25ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
];

/// Buckets for embedding latency (typically slower)
pub const EMBEDDING_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.000,  // 2s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Search metrics
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of retrieval calls"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from the last retrieval"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Fan-out metrics
    describe_counter!(
        format!("{}_fanout_tasks_total", METRICS_PREFIX),
        Unit::Count,
        "Fan-out tasks by outcome"
    );

    // Legal feature metrics
    describe_counter!(
        format!("{}_legal_contexts_total", METRICS_PREFIX),
        Unit::Count,
        "Legal feature contexts produced"
    );

    describe_gauge!(
        format!("{}_legal_features_detected", METRICS_PREFIX),
        Unit::Count,
        "Canonical features detected in the last request"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, mode: &str, result_count: usize) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
        tracing::trace!(model = model, batch_size = batch_size, "Embedding batch recorded");
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Helper to record fan-out outcomes
pub fn record_fanout(operation: &str, succeeded: usize, failed: usize) {
    counter!(
        format!("{}_fanout_tasks_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "outcome" => "success"
    )
    .increment(succeeded as u64);

    counter!(
        format!("{}_fanout_tasks_total", METRICS_PREFIX),
        "operation" => operation.to_string(),
        "outcome" => "failure"
    )
    .increment(failed as u64);
}

/// Helper to record legal feature retrieval
pub fn record_legal(contexts: usize, features: usize) {
    counter!(format!("{}_legal_contexts_total", METRICS_PREFIX)).increment(contexts as u64);
    gauge!(format!("{}_legal_features_detected", METRICS_PREFIX)).set(features as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buckets_sorted() {
        for buckets in [LATENCY_BUCKETS, EMBEDDING_BUCKETS] {
            let mut prev = 0.0;
            for &bucket in buckets {
                assert!(bucket > prev);
                prev = bucket;
            }
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops and must not panic
        register_metrics();
        record_search(0.01, "hybrid", 3);
        record_embedding(0.2, "mock", 4, false);
        record_fanout("query_collection", 2, 3);
        record_legal(1, 2);
    }
}
