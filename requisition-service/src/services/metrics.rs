//! Prometheus metrics for requisition-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "requisition_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for ledger operations by operation and outcome.
pub static LEDGER_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "requisition_ledger_operations_total",
        "Total number of ledger operations",
        &["operation", "status"]
    )
    .expect("Failed to register LEDGER_OPERATIONS")
});

/// Counter for blob compensation attempts after a failed transaction.
pub static BLOB_COMPENSATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "requisition_blob_compensations_total",
        "Blob deletions triggered by a failed ledger transaction",
        &["status"]
    )
    .expect("Failed to register BLOB_COMPENSATIONS")
});

/// Counter for review notifications.
pub static NOTIFICATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "requisition_notifications_total",
        "Review notifications by outcome",
        &["status"]
    )
    .expect("Failed to register NOTIFICATIONS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&LEDGER_OPERATIONS);
    Lazy::force(&BLOB_COMPENSATIONS);
    Lazy::force(&NOTIFICATIONS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a ledger operation outcome.
pub fn record_ledger_operation(operation: &str, status: &str) {
    LEDGER_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record a blob compensation outcome.
pub fn record_blob_compensation(status: &str) {
    BLOB_COMPENSATIONS.with_label_values(&[status]).inc();
}

/// Record a notification outcome.
pub fn record_notification(status: &str) {
    NOTIFICATIONS.with_label_values(&[status]).inc();
}
