// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the clusterzone controller.
//!
//! All metrics carry the namespace prefix `clusterzone_`.
//!
//! # Metrics Categories
//!
//! - **Cycle Metrics** - Track reconciliation cycles, their outcome and duration
//! - **Record Metrics** - Track record changes and the size of the desired and observed sets
//! - **Error Metrics** - Track failures by cycle stage
//! - **Authority Metrics** - Track requests sent to the DNS authority
//!
//! # Example
//!
//! ```rust,no_run
//! use clusterzone::metrics::record_cycle;
//!
//! record_cycle("success", std::time::Duration::from_secs(1));
//! ```

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all clusterzone metrics
const METRICS_NAMESPACE: &str = "clusterzone";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Cycle Metrics
// ============================================================================

/// Total number of reconciliation cycles by outcome
///
/// Labels:
/// - `outcome`: `success`, `error` or `timeout`
pub static CYCLES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_cycles_total"),
        "Total number of reconciliation cycles by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliation cycles in seconds
///
/// Labels:
/// - `outcome`: `success`, `error` or `timeout`
pub static CYCLE_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_cycle_duration_seconds"),
        "Duration of reconciliation cycles in seconds by outcome",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]);
    let histogram = HistogramVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Number of consecutive failed cycles (0 after a success)
pub static CONSECUTIVE_FAILURES: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_consecutive_failures"),
        "Number of consecutive failed reconciliation cycles",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Record Metrics
// ============================================================================

/// Total number of records changed in the zone
///
/// Labels:
/// - `action`: `upsert` or `delete`
pub static RECORDS_CHANGED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_records_changed_total"),
        "Total number of zone records changed by action",
    );
    let counter = CounterVec::new(opts, &["action"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Number of records in the last computed sets
///
/// Labels:
/// - `set`: `desired` or `observed`
pub static RECORDS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_records"),
        "Number of records in the last desired and observed sets",
    );
    let gauge = GaugeVec::new(opts, &["set"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of failed cycles by the stage that failed
///
/// Labels:
/// - `stage`: `bootstrapping`, `reading`, `diffing` or `applying`
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of failed reconciliation cycles by stage",
    );
    let counter = CounterVec::new(opts, &["stage"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Authority Metrics
// ============================================================================

/// Total number of requests sent to the DNS authority
///
/// Labels:
/// - `operation`: `find_zones`, `create_zone`, `list_records` or `submit_changes`
/// - `outcome`: `success` or `error`
pub static AUTHORITY_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_authority_requests_total"),
        "Total number of DNS authority requests by operation and outcome",
    );
    let counter = CounterVec::new(opts, &["operation", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a finished reconciliation cycle
///
/// # Arguments
/// * `outcome` - `success`, `error` or `timeout`
/// * `duration` - Wall time of the cycle
pub fn record_cycle(outcome: &str, duration: Duration) {
    CYCLES_TOTAL.with_label_values(&[outcome]).inc();
    CYCLE_DURATION_SECONDS
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

/// Record records changed in the zone
#[allow(clippy::cast_precision_loss)]
pub fn record_records_changed(action: &str, count: usize) {
    if count > 0 {
        RECORDS_CHANGED_TOTAL
            .with_label_values(&[action])
            .inc_by(count as f64);
    }
}

/// Record a failed cycle
///
/// # Arguments
/// * `stage` - Stage that failed (e.g., `reading`)
pub fn record_cycle_error(stage: &str) {
    ERRORS_TOTAL.with_label_values(&[stage]).inc();
}

/// Publish the size of the last desired and observed sets
#[allow(clippy::cast_precision_loss)]
pub fn set_record_counts(desired: usize, observed: usize) {
    RECORDS.with_label_values(&["desired"]).set(desired as f64);
    RECORDS.with_label_values(&["observed"]).set(observed as f64);
}

/// Publish the number of consecutive failed cycles
pub fn set_consecutive_failures(failures: u32) {
    CONSECUTIVE_FAILURES.set(f64::from(failures));
}

/// Record a request to the DNS authority
///
/// # Arguments
/// * `operation` - Authority operation (e.g., `list_records`)
/// * `success` - Whether the request (including retries) succeeded
pub fn record_authority_request(operation: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    AUTHORITY_REQUESTS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_cycle() {
        record_cycle("success", Duration::from_millis(500));

        let counter = CYCLES_TOTAL.with_label_values(&["success"]);
        assert!(counter.get() > 0.0);

        let histogram = CYCLE_DURATION_SECONDS.with_label_values(&["success"]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_records_changed_skips_zero() {
        let before = RECORDS_CHANGED_TOTAL
            .with_label_values(&["metrics-test"])
            .get();

        record_records_changed("metrics-test", 0);
        record_records_changed("metrics-test", 3);

        let after = RECORDS_CHANGED_TOTAL
            .with_label_values(&["metrics-test"])
            .get();
        assert!((after - before - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_record_counts() {
        set_record_counts(7, 5);

        assert!(RECORDS.with_label_values(&["desired"]).get() >= 0.0);
        assert!(RECORDS.with_label_values(&["observed"]).get() >= 0.0);
    }

    #[test]
    fn test_record_authority_request() {
        record_authority_request("metrics_test_op", false);

        let counter = AUTHORITY_REQUESTS_TOTAL.with_label_values(&["metrics_test_op", "error"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn test_gather_metrics() {
        record_cycle("error", Duration::from_millis(100));
        record_cycle_error("reading");

        let metrics_text = gather_metrics().expect("gathering metrics should succeed");

        assert!(metrics_text.contains("clusterzone_cycles_total"));
        assert!(metrics_text.contains("clusterzone_errors_total"));
    }
}
