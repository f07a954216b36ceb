//! Coordinator Metrics
//!
//! Prometheus counters and latency histograms for the ranking coordinator,
//! registered on a private registry so several coordinators (one per test)
//! can coexist in one process.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::error::{Error, Result};

/// Metrics for coordinator operations and cache behaviour
pub struct CoordinatorMetrics {
    registry: Registry,
    operations: IntCounterVec,
    latency: HistogramVec,
    cache_lookups: IntCounterVec,
    repopulations: IntCounter,
    degraded_writes: IntCounter,
}

fn registration(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registration failed: {}", e))
}

impl CoordinatorMetrics {
    /// Create and register every metric
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let operations = IntCounterVec::new(
            Opts::new(
                "leaderboard_operations_total",
                "Coordinator operations by name and outcome",
            ),
            &["operation", "outcome"],
        )
        .map_err(registration)?;

        let latency = HistogramVec::new(
            HistogramOpts::new(
                "leaderboard_operation_seconds",
                "Coordinator operation latency",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )
        .map_err(registration)?;

        let cache_lookups = IntCounterVec::new(
            Opts::new(
                "leaderboard_cache_lookups_total",
                "Student hydration attempts against the rank cache",
            ),
            &["result"],
        )
        .map_err(registration)?;

        let repopulations = IntCounter::new(
            "leaderboard_cache_repopulations_total",
            "Cache misses resolved from the durable store",
        )
        .map_err(registration)?;

        let degraded_writes = IntCounter::new(
            "leaderboard_cache_degraded_writes_total",
            "Cache write-through failures after a durable commit",
        )
        .map_err(registration)?;

        registry
            .register(Box::new(operations.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(latency.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(cache_lookups.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(repopulations.clone()))
            .map_err(registration)?;
        registry
            .register(Box::new(degraded_writes.clone()))
            .map_err(registration)?;

        Ok(Self {
            registry,
            operations,
            latency,
            cache_lookups,
            repopulations,
            degraded_writes,
        })
    }

    /// Record one finished operation
    pub fn record_operation(&self, operation: &str, outcome: &str, elapsed: Duration) {
        self.operations
            .with_label_values(&[operation, outcome])
            .inc();
        self.latency
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_cache_hit(&self) {
        self.cache_lookups.with_label_values(&["hit"]).inc();
    }

    pub fn record_cache_miss(&self) {
        self.cache_lookups.with_label_values(&["miss"]).inc();
    }

    pub fn record_repopulation(&self) {
        self.repopulations.inc();
    }

    pub fn record_degraded_write(&self) {
        self.degraded_writes.inc();
    }

    pub fn operations(&self, operation: &str, outcome: &str) -> u64 {
        self.operations
            .with_label_values(&[operation, outcome])
            .get()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_lookups.with_label_values(&["hit"]).get()
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_lookups.with_label_values(&["miss"]).get()
    }

    pub fn repopulations(&self) -> u64 {
        self.repopulations.get()
    }

    pub fn degraded_writes(&self) -> u64 {
        self.degraded_writes.get()
    }

    /// Render in the Prometheus text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("metrics encoding failed: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = CoordinatorMetrics::new().unwrap();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_cache_miss();
        metrics.record_repopulation();
        metrics.record_operation("get_rank", "ok", Duration::from_millis(1));

        assert_eq!(metrics.cache_hits(), 2);
        assert_eq!(metrics.cache_misses(), 1);
        assert_eq!(metrics.repopulations(), 1);
        assert_eq!(metrics.degraded_writes(), 0);
        assert_eq!(metrics.operations("get_rank", "ok"), 1);
    }

    #[test]
    fn test_encode() {
        let metrics = CoordinatorMetrics::new().unwrap();
        metrics.record_operation("create_student", "ok", Duration::from_millis(2));
        let text = metrics.encode().unwrap();
        assert!(text.contains("leaderboard_operations_total"));
        assert!(text.contains("create_student"));
    }

    #[test]
    fn test_independent_registries() {
        let a = CoordinatorMetrics::new().unwrap();
        let b = CoordinatorMetrics::new().unwrap();
        a.record_degraded_write();
        assert_eq!(a.degraded_writes(), 1);
        assert_eq!(b.degraded_writes(), 0);
    }
}
