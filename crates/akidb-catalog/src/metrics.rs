//! Prometheus metrics for the aggregation engine
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.
//! Partition failures are recorded here rather than surfaced to callers.

use once_cell::sync::Lazy;
use prometheus::{register_histogram_vec, register_int_counter_vec, HistogramVec, IntCounterVec};

/// Total list requests by strategy and outcome
pub static LIST_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akidb_catalog_list_requests_total",
        "Total number of catalog list requests",
        &["strategy", "outcome"]
    )
    .expect("Failed to register list request counter")
});

/// List request latency histogram
pub static LIST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "akidb_catalog_list_duration_seconds",
        "Catalog list request duration in seconds",
        &["strategy"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register list duration histogram")
});

/// Repository calls that failed after exhausting retries
pub static PARTITION_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akidb_catalog_partition_failures_total",
        "Repository calls treated as empty after retries were exhausted",
        &["operation"]
    )
    .expect("Failed to register partition failure counter")
});

/// Individual retry attempts against repositories
pub static PARTITION_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akidb_catalog_partition_retries_total",
        "Retried repository calls",
        &["operation"]
    )
    .expect("Failed to register partition retry counter")
});

/// Pagination tokens discarded in favor of a fresh start
pub static TOKEN_RESETS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akidb_catalog_token_resets_total",
        "Pagination tokens discarded and restarted from the beginning",
        &["reason"]
    )
    .expect("Failed to register token reset counter")
});

/// Seen-id windows that hit their cap and forced cursor advancement
pub static SEEN_OVERFLOWS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "akidb_catalog_seen_overflows_total",
        "Per-repository seen-id sets that exceeded their cap",
        &["repository"]
    )
    .expect("Failed to register seen overflow counter")
});
