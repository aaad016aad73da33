//! Observability infrastructure for the crash-dump collector
//!
//! Provides:
//! - Prometheus metrics (collections, section failures, timeouts, run duration)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for whole-run durations (in seconds)
const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CrashdumpMetricsInner> = OnceLock::new();

struct CrashdumpMetricsInner {
    collections_total: IntCounterVec,
    section_failures_total: IntCounter,
    timeouts_total: IntCounterVec,
    collection_duration_seconds: Histogram,
    cpus_discovered: IntGauge,
    stored_logs: IntGauge,
}

impl CrashdumpMetricsInner {
    fn new() -> Self {
        Self {
            collections_total: register_int_counter_vec!(
                "crashdump_collections_total",
                "Number of collection runs by trigger type",
                &["trigger"]
            )
            .expect("Failed to register collections_total"),

            section_failures_total: register_int_counter!(
                "crashdump_section_failures_total",
                "Number of sections that reported a failure"
            )
            .expect("Failed to register section_failures_total"),

            timeouts_total: register_int_counter_vec!(
                "crashdump_timeouts_total",
                "Number of exceeded time budgets by scope",
                &["scope"]
            )
            .expect("Failed to register timeouts_total"),

            collection_duration_seconds: register_histogram!(
                "crashdump_collection_duration_seconds",
                "Wall-clock duration of a collection run",
                DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register collection_duration_seconds"),

            cpus_discovered: register_int_gauge!(
                "crashdump_cpus_discovered",
                "Number of processors with a valid identity"
            )
            .expect("Failed to register cpus_discovered"),

            stored_logs: register_int_gauge!(
                "crashdump_stored_logs",
                "Number of crash dumps currently stored"
            )
            .expect("Failed to register stored_logs"),
        }
    }
}

/// Collector metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share it.
#[derive(Clone)]
pub struct CrashdumpMetrics {
    _private: (),
}

impl Default for CrashdumpMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CrashdumpMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CrashdumpMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CrashdumpMetricsInner {
        GLOBAL_METRICS.get_or_init(CrashdumpMetricsInner::new)
    }

    pub fn inc_collections(&self, trigger: &str) {
        self.inner()
            .collections_total
            .with_label_values(&[trigger])
            .inc();
    }

    pub fn inc_section_failures(&self) {
        self.inner().section_failures_total.inc();
    }

    /// `scope` is `"section"` or `"global"`
    pub fn inc_timeouts(&self, scope: &str) {
        self.inner().timeouts_total.with_label_values(&[scope]).inc();
    }

    pub fn observe_collection_duration(&self, duration_secs: f64) {
        self.inner().collection_duration_seconds.observe(duration_secs);
    }

    pub fn set_cpus_discovered(&self, count: i64) {
        self.inner().cpus_discovered.set(count);
    }

    pub fn set_stored_logs(&self, count: i64) {
        self.inner().stored_logs.set(count);
    }
}

/// Structured logger for collector events
#[derive(Clone)]
pub struct StructuredLogger {
    platform: String,
}

impl StructuredLogger {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }

    pub fn log_collection_started(&self, trigger: &str, cpus: usize) {
        info!(
            event = "collection_started",
            platform = %self.platform,
            trigger = %trigger,
            cpus = cpus,
            "Crash-dump collection started"
        );
    }

    pub fn log_section_collected(&self, cpu: usize, section: &str, elapsed_secs: f64) {
        info!(
            event = "section_collected",
            platform = %self.platform,
            cpu = cpu,
            section = %section,
            elapsed_secs = elapsed_secs,
            "Section collected"
        );
    }

    pub fn log_section_failed(&self, cpu: usize, section: &str, status: &str) {
        warn!(
            event = "section_failed",
            platform = %self.platform,
            cpu = cpu,
            section = %section,
            status = %status,
            "Section collection failed"
        );
    }

    pub fn log_collection_complete(
        &self,
        trigger: &str,
        failures: u32,
        global_timeout: bool,
        elapsed_secs: f64,
    ) {
        if failures > 0 || global_timeout {
            warn!(
                event = "collection_complete",
                platform = %self.platform,
                trigger = %trigger,
                failures = failures,
                global_timeout = global_timeout,
                elapsed_secs = elapsed_secs,
                "Crash-dump collection finished with failures"
            );
        } else {
            info!(
                event = "collection_complete",
                platform = %self.platform,
                trigger = %trigger,
                failures = failures,
                global_timeout = global_timeout,
                elapsed_secs = elapsed_secs,
                "Crash-dump collection finished"
            );
        }
    }

    pub fn log_stored(&self, name: &str, bytes: usize) {
        info!(
            event = "log_stored",
            platform = %self.platform,
            name = %name,
            bytes = bytes,
            "Crash dump stored"
        );
    }

    pub fn log_startup(&self, version: &str, cpus: usize) {
        info!(
            event = "daemon_started",
            platform = %self.platform,
            version = %version,
            cpus = cpus,
            "Crash-dump daemon started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "daemon_shutdown",
            platform = %self.platform,
            reason = %reason,
            "Crash-dump daemon shutting down"
        );
    }
}
