//! Prometheus metrics for wallet-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};
use std::sync::OnceLock;

/// Recorder behind the `metrics` macros used by the HTTP middleware.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Wallet operations by operation and outcome.
pub static WALLET_OPERATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_operations_total",
        "Total number of wallet operations",
        &["operation", "outcome"]
    )
    .expect("Failed to register wallet_operations_total")
});

/// Webhook deliveries by outcome.
pub static WEBHOOK_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_webhook_events_total",
        "Total number of payment webhook deliveries",
        &["outcome"] // credited, duplicate, ignored, unknown_reference, amount_mismatch, ...
    )
    .expect("Failed to register webhook_events_total")
});

/// API key validations by outcome.
pub static CREDENTIAL_VALIDATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "wallet_credential_validations_total",
        "Total number of API key validations",
        &["outcome"]
    )
    .expect("Failed to register credential_validations_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "wallet_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Record the outcome of a wallet operation.
pub fn record_operation(operation: &str, outcome: &str) {
    WALLET_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Initialize all metrics (forces lazy initialization).
///
/// Safe to call more than once; only the first call installs the recorder.
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_none() {
        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let _ = METRICS_HANDLE.set(handle);
            }
            Err(e) => tracing::warn!(error = %e, "Prometheus recorder already installed"),
        }
    }

    Lazy::force(&WALLET_OPERATIONS_TOTAL);
    Lazy::force(&WEBHOOK_EVENTS_TOTAL);
    Lazy::force(&CREDENTIAL_VALIDATIONS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default();

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if let Ok(custom) = encoder.encode_to_string(&metric_families) {
        output.push_str(&custom);
    }
    output
}
