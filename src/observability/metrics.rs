//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `annotation_controller_syncs_total` - Total number of sync passes
//! - `annotation_controller_sync_errors_total` - Total number of sync passes that returned an error
//! - `annotation_controller_sync_duration_seconds` - Duration of sync passes
//! - `annotation_controller_targets_applied_total` - Targets applied, by kind
//! - `annotation_controller_unknown_target_kinds_total` - Targets skipped because their kind is not registered
//! - `annotation_controller_workqueue_depth` - Keys currently waiting in the work queue
//! - `annotation_controller_workqueue_adds_total` - Keys added to the work queue
//! - `annotation_controller_workqueue_retries_total` - Rate-limited requeues

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static SYNCS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "annotation_controller_syncs_total",
        "Total number of sync passes",
    )
    .expect("Failed to create SYNCS_TOTAL metric - this should never happen")
});

static SYNC_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "annotation_controller_sync_errors_total",
        "Total number of sync passes that returned an error",
    )
    .expect("Failed to create SYNC_ERRORS_TOTAL metric - this should never happen")
});

static SYNC_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "annotation_controller_sync_duration_seconds",
            "Duration of sync passes in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
    )
    .expect("Failed to create SYNC_DURATION metric - this should never happen")
});

static TARGETS_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "annotation_controller_targets_applied_total",
            "Total number of targets applied by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create TARGETS_APPLIED_TOTAL metric - this should never happen")
});

static UNKNOWN_TARGET_KINDS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "annotation_controller_unknown_target_kinds_total",
        "Total number of targets skipped because no handler is registered for their kind",
    )
    .expect("Failed to create UNKNOWN_TARGET_KINDS_TOTAL metric - this should never happen")
});

static WORKQUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "annotation_controller_workqueue_depth",
        "Number of keys waiting in the work queue",
    )
    .expect("Failed to create WORKQUEUE_DEPTH metric - this should never happen")
});

static WORKQUEUE_ADDS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "annotation_controller_workqueue_adds_total",
        "Total number of keys added to the work queue",
    )
    .expect("Failed to create WORKQUEUE_ADDS_TOTAL metric - this should never happen")
});

static WORKQUEUE_RETRIES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "annotation_controller_workqueue_retries_total",
        "Total number of rate-limited requeues",
    )
    .expect("Failed to create WORKQUEUE_RETRIES_TOTAL metric - this should never happen")
});

/// Register all metrics with the shared registry
///
/// Fails if called twice, since the registry rejects duplicate collectors.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(SYNCS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_DURATION.clone()))?;
    REGISTRY.register(Box::new(TARGETS_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(UNKNOWN_TARGET_KINDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKQUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(WORKQUEUE_ADDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WORKQUEUE_RETRIES_TOTAL.clone()))?;

    Ok(())
}

/// Gather every registered metric family
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

pub fn increment_syncs() {
    SYNCS_TOTAL.inc();
}

pub fn increment_sync_errors() {
    SYNC_ERRORS_TOTAL.inc();
}

pub fn observe_sync_duration(duration: f64) {
    SYNC_DURATION.observe(duration);
}

pub fn increment_targets_applied(kind: &str) {
    TARGETS_APPLIED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_unknown_target_kinds() {
    UNKNOWN_TARGET_KINDS_TOTAL.inc();
}

pub fn set_workqueue_depth(depth: usize) {
    WORKQUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}

pub fn increment_workqueue_adds() {
    WORKQUEUE_ADDS_TOTAL.inc();
}

pub fn increment_workqueue_retries() {
    WORKQUEUE_RETRIES_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_syncs() {
        let before = SYNCS_TOTAL.get();
        increment_syncs();
        let after = SYNCS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_increment_sync_errors() {
        let before = SYNC_ERRORS_TOTAL.get();
        increment_sync_errors();
        let after = SYNC_ERRORS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_targets_applied_labelled_by_kind() {
        let before = TARGETS_APPLIED_TOTAL.with_label_values(&["metrics-test"]).get();
        increment_targets_applied("metrics-test");
        increment_targets_applied("metrics-test");
        let after = TARGETS_APPLIED_TOTAL.with_label_values(&["metrics-test"]).get();
        assert_eq!(after, before + 2);
    }

    #[test]
    fn test_observe_sync_duration() {
        observe_sync_duration(0.25);
        // Just verify it doesn't panic - histogram observation doesn't return a value
    }
}
