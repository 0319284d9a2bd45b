//! Prometheus metrics for the portti operator
//!
//! Exposes controller health and rollout activity:
//! - Reconciliation counts and durations, per controller
//! - Blue-Green promotions
//! - Duplicate owned-resource reductions

use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Controller metrics registry
///
/// Thread-safe container for all Prometheus metrics.
/// Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct ControllerMetrics {
    registry: Registry,
    /// Total reconciliations by controller and result
    pub reconciliations_total: IntCounterVec,
    /// Reconciliation duration in seconds, per controller
    pub reconcile_duration_seconds: HistogramVec,
    /// Blue-Green promotions performed
    pub promotions_total: IntCounter,
    /// Duplicate owned resources deleted by the reducer, per kind
    pub duplicate_reductions_total: IntCounterVec,
}

impl ControllerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations_total = IntCounterVec::new(
            Opts::new(
                "portti_reconciliations_total",
                "Total number of reconciliations",
            ),
            &["controller", "result"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let reconcile_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "portti_reconcile_duration_seconds",
                "Duration of reconciliation in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["controller"],
        )?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;

        let promotions_total = IntCounter::with_opts(Opts::new(
            "portti_promotions_total",
            "Blue-Green promotions performed",
        ))?;
        registry.register(Box::new(promotions_total.clone()))?;

        let duplicate_reductions_total = IntCounterVec::new(
            Opts::new(
                "portti_duplicate_reductions_total",
                "Duplicate owned resources deleted by the reducer",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(duplicate_reductions_total.clone()))?;

        Ok(Self {
            registry,
            reconciliations_total,
            reconcile_duration_seconds,
            promotions_total,
            duplicate_reductions_total,
        })
    }

    pub fn record_reconciliation_success(&self, controller: &str, duration_secs: f64) {
        self.reconciliations_total
            .with_label_values(&[controller, "success"])
            .inc();
        self.reconcile_duration_seconds
            .with_label_values(&[controller])
            .observe(duration_secs);
    }

    /// Optimistic-concurrency conflicts get their own result label so
    /// requeue churn is visible separately from clean passes.
    pub fn record_reconciliation_conflict(&self, controller: &str, duration_secs: f64) {
        self.reconciliations_total
            .with_label_values(&[controller, "conflict"])
            .inc();
        self.reconcile_duration_seconds
            .with_label_values(&[controller])
            .observe(duration_secs);
    }

    pub fn record_reconciliation_error(&self, controller: &str, duration_secs: f64) {
        self.reconciliations_total
            .with_label_values(&[controller, "error"])
            .inc();
        self.reconcile_duration_seconds
            .with_label_values(&[controller])
            .observe(duration_secs);
    }

    pub fn record_promotion(&self) {
        self.promotions_total.inc();
    }

    pub fn record_duplicate_reduction(&self, kind: &str) {
        self.duplicate_reductions_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }
}

/// Shared metrics handle for use across the controllers
pub type SharedMetrics = Arc<ControllerMetrics>;

pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new()?))
}

#[cfg(test)]
#[path = "metrics_test.rs"]
mod tests;
