//! # Metrics
//!
//! Prometheus metrics for the reconciliation engine and the topic provisioner.
//!
//! ## Metrics Exposed
//!
//! - `riff_reconciliations_total` - Reconcile passes by parent kind
//! - `riff_reconciliation_errors_total` - Failed reconcile passes by parent kind
//! - `riff_reconciliation_duration_seconds` - Duration of reconcile passes by parent kind
//! - `riff_child_operations_total` - Child creates, updates and deletes by child kind
//! - `riff_status_updates_total` - Parent status writes by parent kind
//! - `riff_tracked_enqueues_total` - Parents enqueued because a tracked object changed
//! - `riff_requeues_total` - Requeues by reason
//! - `riff_topics_provisioned_total` - Topic provisioning requests by outcome

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("riff_reconciliations_total", "Total number of reconcile passes"),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "riff_reconciliation_errors_total",
            "Total number of failed reconcile passes",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "riff_reconciliation_duration_seconds",
            "Duration of reconcile passes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static CHILD_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "riff_child_operations_total",
            "Total number of child writes by child kind and operation",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create CHILD_OPERATIONS_TOTAL metric - this should never happen")
});

static STATUS_UPDATES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("riff_status_updates_total", "Total number of parent status writes"),
        &["kind"],
    )
    .expect("Failed to create STATUS_UPDATES_TOTAL metric - this should never happen")
});

static TRACKED_ENQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "riff_tracked_enqueues_total",
            "Total number of parents enqueued because a tracked object changed",
        ),
        &["kind"],
    )
    .expect("Failed to create TRACKED_ENQUEUES_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("riff_requeues_total", "Total number of requeues by reason"),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static TOPICS_PROVISIONED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "riff_topics_provisioned_total",
            "Total number of topic provisioning requests by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create TOPICS_PROVISIONED_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CHILD_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_UPDATES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRACKED_ENQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TOPICS_PROVISIONED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_child_operations(kind: &str, operation: &str) {
    CHILD_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
}

pub fn increment_status_updates(kind: &str) {
    STATUS_UPDATES_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_tracked_enqueues(kind: &str, count: usize) {
    TRACKED_ENQUEUES_TOTAL
        .with_label_values(&[kind])
        .inc_by(count as u64);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_topics_provisioned(outcome: &str) {
    TOPICS_PROVISIONED_TOTAL.with_label_values(&[outcome]).inc();
}
