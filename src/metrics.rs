//! Reconcile counters exposed on the metrics endpoint (§2 Bootstrap).
//! Grounded on the `prometheus`-registry idiom used throughout the
//! kube-rs-based operators in the retrieval pack: a plain struct of
//! `prometheus` collectors, built once and registered into a
//! `prometheus::Registry` that the HTTP handler gathers on every scrape.

use std::time::Duration;

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Counters and a duration histogram for the reconcile loop.
#[derive(Clone)]
pub struct Metrics {
    reconciliations: IntCounter,
    reconcile_errors: IntCounterVec,
    reconcile_duration: Histogram,
}

impl Metrics {
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self {
            reconciliations: IntCounter::new(
                "redis_operator_reconciliations_total",
                "Number of completed reconcile passes across all RedisClusters",
            )
            .expect("failed to create redis_operator_reconciliations_total counter"),
            reconcile_errors: IntCounterVec::new(
                Opts::new(
                    "redis_operator_reconcile_errors_total",
                    "Number of reconcile passes that returned an error, by stage",
                ),
                &["stage"],
            )
            .expect("failed to create redis_operator_reconcile_errors_total counter"),
            reconcile_duration: Histogram::with_opts(
                HistogramOpts::new(
                    "redis_operator_reconcile_duration_seconds",
                    "Wall-clock duration of a single reconcile pass",
                )
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            )
            .expect("failed to create redis_operator_reconcile_duration_seconds histogram"),
        }
    }

    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.reconciliations.clone()))?;
        registry.register(Box::new(self.reconcile_errors.clone()))?;
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        Ok(())
    }

    pub fn record_success(&self, elapsed: Duration) {
        self.reconciliations.inc();
        self.reconcile_duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_error(&self, stage: &str, elapsed: Duration) {
        self.reconcile_errors.with_label_values(&[stage]).inc();
        self.reconcile_duration.observe(elapsed.as_secs_f64());
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared registry plus the typed counters above; handed to the reconciler's
/// [`crate::reconciler::Context`] and to the metrics HTTP handler.
#[derive(Clone)]
pub struct Registered {
    pub registry: Registry,
    pub metrics: Metrics,
}

impl Registered {
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let registry = Registry::new();
        let metrics = Metrics::new();
        metrics.register(&registry).expect("failed to register redis-operator metrics");
        Self { registry, metrics }
    }

    /// Renders the current registry in the Prometheus text exposition format.
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).unwrap_or_default();
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for Registered {
    fn default() -> Self {
        Self::new()
    }
}
