//! Observability infrastructure for the isolation engine
//!
//! Provides:
//! - Prometheus metrics (sampling latency, tenants monitored, violations by type)
//! - Structured event logging with tracing

use crate::models::{Severity, Violation};
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for sampling pass latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    sampling_latency_seconds: Histogram,
    tenants_monitored: IntGauge,
    samples_collected: IntCounter,
    sampling_errors: IntCounter,
    violations_detected: IntCounterVec,
    callback_failures: IntCounter,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            sampling_latency_seconds: register_histogram!(
                "tenant_isolation_sampling_latency_seconds",
                "Time spent sampling all registered tenant processes",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register sampling_latency_seconds"),

            tenants_monitored: register_int_gauge!(
                "tenant_isolation_tenants_monitored",
                "Number of tenants with a registered process binding"
            )
            .expect("Failed to register tenants_monitored"),

            samples_collected: register_int_counter!(
                "tenant_isolation_samples_collected_total",
                "Total number of resource snapshots appended"
            )
            .expect("Failed to register samples_collected"),

            sampling_errors: register_int_counter!(
                "tenant_isolation_sampling_errors_total",
                "Total number of failed process samples"
            )
            .expect("Failed to register sampling_errors"),

            violations_detected: register_int_counter_vec!(
                "tenant_isolation_violations_total",
                "Total number of violations reported, by type",
                &["violation_type"]
            )
            .expect("Failed to register violations_detected"),

            callback_failures: register_int_counter!(
                "tenant_isolation_callback_failures_total",
                "Total number of violation callbacks that failed or panicked"
            )
            .expect("Failed to register callback_failures"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share
/// the same collectors.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn observe_sampling_latency(&self, duration_secs: f64) {
        self.inner().sampling_latency_seconds.observe(duration_secs);
    }

    pub fn set_tenants_monitored(&self, count: i64) {
        self.inner().tenants_monitored.set(count);
    }

    pub fn inc_samples_collected(&self) {
        self.inner().samples_collected.inc();
    }

    pub fn inc_sampling_errors(&self) {
        self.inner().sampling_errors.inc();
    }

    pub fn inc_violation(&self, violation_type: &str) {
        self.inner()
            .violations_detected
            .with_label_values(&[violation_type])
            .inc();
    }

    pub fn inc_callback_failures(&self) {
        self.inner().callback_failures.inc();
    }
}

/// Structured logger for engine events
///
/// Emits event-shaped log lines for violations, sampling failures
/// and lifecycle changes.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a reported violation
    pub fn log_violation(&self, violation: &Violation) {
        let details = serde_json::to_string(&violation.details).unwrap_or_default();
        match violation.severity {
            Severity::High | Severity::Critical => {
                warn!(
                    event = "violation_detected",
                    node = %self.node_name,
                    tenant_id = %violation.tenant_id,
                    violation_type = %violation.violation_type,
                    severity = %violation.severity,
                    measured_value = violation.measured_value,
                    threshold_value = violation.threshold_value,
                    details = %details,
                    "Isolation violation detected"
                );
            }
            _ => {
                info!(
                    event = "violation_detected",
                    node = %self.node_name,
                    tenant_id = %violation.tenant_id,
                    violation_type = %violation.violation_type,
                    severity = %violation.severity,
                    measured_value = violation.measured_value,
                    threshold_value = violation.threshold_value,
                    details = %details,
                    "Isolation violation detected"
                );
            }
        }
    }

    /// Log a failed process sample
    pub fn log_sampling_failure(&self, tenant_id: &str, process: &str, error: &str) {
        warn!(
            event = "sampling_failed",
            node = %self.node_name,
            tenant_id = %tenant_id,
            process = %process,
            error = %error,
            "Failed to sample tenant process, skipping this cycle"
        );
    }

    /// Log engine startup
    pub fn log_startup(&self, version: &str, tenants: usize) {
        info!(
            event = "engine_started",
            node = %self.node_name,
            version = %version,
            tenants = tenants,
            "Isolation engine started"
        );
    }

    /// Log engine shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Isolation engine shutting down"
        );
    }
}
