//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `secret_sync_reconciliations_total` - Total number of reconcile passes
//! - `secret_sync_reconciliation_errors_total` - Failed passes by error kind
//! - `secret_sync_reconciliation_duration_seconds` - Duration of reconcile passes
//! - `secret_sync_reconciliations_in_flight` - Passes currently running
//! - `secret_sync_requeues_total` - Scheduled re-runs by trigger source
//! - `secret_sync_flood_gate_holds_total` - Passes held back by an unhealthy store
//! - `secret_sync_store_validations_total` - Store health probes by result
//! - `secret_sync_provider_operations_total` - Backend calls by provider and operation
//! - `secret_sync_provider_operation_duration_seconds` - Duration of backend calls

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_sync_reconciliations_total",
        "Total number of reconcile passes",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_sync_reconciliation_errors_total",
            "Total number of failed reconcile passes by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "secret_sync_reconciliation_duration_seconds",
            "Duration of reconcile passes in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static RECONCILIATIONS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "secret_sync_reconciliations_in_flight",
        "Number of reconcile passes currently running",
    )
    .expect("Failed to create RECONCILIATIONS_IN_FLIGHT metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_sync_requeues_total",
            "Total number of scheduled re-runs by trigger source",
        ),
        &["trigger"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static FLOOD_GATE_HOLDS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "secret_sync_flood_gate_holds_total",
        "Total number of passes held back because a store was not known healthy",
    )
    .expect("Failed to create FLOOD_GATE_HOLDS_TOTAL metric - this should never happen")
});

static STORE_VALIDATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_sync_store_validations_total",
            "Total number of store health probes by result",
        ),
        &["result"],
    )
    .expect("Failed to create STORE_VALIDATIONS_TOTAL metric - this should never happen")
});

static PROVIDER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "secret_sync_provider_operations_total",
            "Total number of backend operations by provider and operation",
        ),
        &["provider", "operation"],
    )
    .expect("Failed to create PROVIDER_OPERATIONS_TOTAL metric - this should never happen")
});

static PROVIDER_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "secret_sync_provider_operation_duration_seconds",
            "Duration of backend operations in seconds by provider",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["provider"],
    )
    .expect("Failed to create PROVIDER_OPERATION_DURATION metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_IN_FLIGHT.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FLOOD_GATE_HOLDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_VALIDATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATION_DURATION.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn set_reconciliations_in_flight(count: usize) {
    RECONCILIATIONS_IN_FLIGHT.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_requeues(trigger: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn increment_flood_gate_holds() {
    FLOOD_GATE_HOLDS_TOTAL.inc();
}

pub fn increment_store_validations(result: &str) {
    STORE_VALIDATIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Record one backend call
pub fn record_provider_operation(provider: &str, operation: &str, duration: f64) {
    PROVIDER_OPERATIONS_TOTAL
        .with_label_values(&[provider, operation])
        .inc();
    PROVIDER_OPERATION_DURATION
        .with_label_values(&[provider])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_counters() {
        let before = REQUEUES_TOTAL.with_label_values(&["metrics-test"]).get();
        increment_requeues("metrics-test");
        assert_eq!(REQUEUES_TOTAL.with_label_values(&["metrics-test"]).get(), before + 1);

        record_provider_operation("memory", "get", 0.01);
        assert!(
            PROVIDER_OPERATIONS_TOTAL
                .with_label_values(&["memory", "get"])
                .get()
                >= 1
        );
    }
}
