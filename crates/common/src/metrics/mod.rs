//! Metrics and observability utilities
//!
//! Prometheus-style metrics with standardized naming, recorded through the
//! `metrics` facade. No exporter is installed here; binaries decide.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all HybridRank metrics
pub const METRICS_PREFIX: &str = "hybridrank";

/// Histogram buckets for search latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of search requests by strategy used"
    );

    describe_histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end search latency in seconds"
    );

    describe_gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        Unit::Count,
        "Number of results returned from the last search"
    );

    describe_counter!(
        format!("{}_backend_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Retrieval backend failures and timeouts"
    );

    describe_counter!(
        format!("{}_rerank_batch_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Rerank model batches scored as zero after a failure"
    );

    describe_histogram!(
        format!("{}_rerank_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Rerank latency in seconds"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_gauge!(
        format!("{}_pagerank_iterations", METRICS_PREFIX),
        Unit::Count,
        "Iterations used by the last PageRank run"
    );

    describe_histogram!(
        format!("{}_pagerank_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "PageRank job duration in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Times a search request from creation to `finish`
pub struct SearchTimer {
    start: Instant,
}

impl SearchTimer {
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Record completion under the strategy actually used
    pub fn finish(self, strategy: &str, result_count: usize, cached: bool) {
        record_search(self.elapsed_secs(), strategy, result_count, cached);
    }
}

/// Helper to record search metrics
pub fn record_search(duration_secs: f64, strategy: &str, result_count: usize, cached: bool) {
    counter!(
        format!("{}_search_queries_total", METRICS_PREFIX),
        "strategy" => strategy.to_string(),
        "cached" => cached.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_search_duration_seconds", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_search_results_count", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .set(result_count as f64);
}

/// Helper to record a degraded backend
pub fn record_backend_failure(backend: &str, reason: &str) {
    counter!(
        format!("{}_backend_failures_total", METRICS_PREFIX),
        "backend" => backend.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Helper to record rerank metrics
pub fn record_rerank(duration_secs: f64, strategy: &str, failed_batches: usize) {
    histogram!(
        format!("{}_rerank_duration_seconds", METRICS_PREFIX),
        "strategy" => strategy.to_string()
    )
    .record(duration_secs);

    if failed_batches > 0 {
        counter!(
            format!("{}_rerank_batch_failures_total", METRICS_PREFIX),
            "strategy" => strategy.to_string()
        )
        .increment(failed_batches as u64);
    }
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    let name = if hit { "cache_hits_total" } else { "cache_misses_total" };
    counter!(
        format!("{}_{}", METRICS_PREFIX, name),
        "cache" => cache_name.to_string()
    )
    .increment(1);
}

/// Helper to record embedding metrics
pub fn record_embedding(model: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Helper to record a finished PageRank run
pub fn record_pagerank(duration_secs: f64, iterations: usize, converged: bool) {
    gauge!(
        format!("{}_pagerank_iterations", METRICS_PREFIX),
        "converged" => converged.to_string()
    )
    .set(iterations as f64);

    histogram!(format!("{}_pagerank_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops and must not panic
        let timer = SearchTimer::start();
        timer.finish("hybrid", 3, false);
        record_backend_failure("dense", "timeout");
        record_rerank(0.01, "cross_encoder", 1);
        record_cache(true, "result");
        record_pagerank(0.5, 42, true);
    }
}
