//! Alert shaping for reported violations
//!
//! Handles:
//! - Deduplication of repeated violations within a configurable window
//! - Formatting violations as Alertmanager webhook alerts

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::models::{Severity, Violation, ViolationType};

/// Default deduplication window (5 minutes)
const DEFAULT_DEDUP_WINDOW_SECS: u64 = 5 * 60;

/// Alertmanager webhook alert format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Alert status (firing or resolved)
    pub status: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    /// Start time in RFC3339 format
    pub starts_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertmanagerPayload {
    pub alerts: Vec<AlertmanagerAlert>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    tenant_id: String,
    violation_type: ViolationType,
}

impl DedupKey {
    fn of(violation: &Violation) -> Self {
        Self {
            tenant_id: violation.tenant_id.clone(),
            violation_type: violation.violation_type,
        }
    }
}

/// Suppresses repeats of the same (tenant, violation type) within a window
pub struct Alerter {
    dedup_window: Duration,
    recent_alerts: RwLock<HashMap<DedupKey, Instant>>,
    node_name: String,
}

impl Alerter {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            dedup_window: Duration::from_secs(DEFAULT_DEDUP_WINDOW_SECS),
            recent_alerts: RwLock::new(HashMap::new()),
            node_name: node_name.into(),
        }
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window = window;
        self
    }

    /// Returns true and records the violation if it is not a duplicate
    ///
    /// The check and the insert happen under one write lock, so concurrent
    /// duplicates admit exactly one.
    pub fn admit(&self, violation: &Violation) -> bool {
        let mut alerts = self.recent_alerts.write().unwrap_or_else(|e| e.into_inner());
        let key = DedupKey::of(violation);
        if let Some(last) = alerts.get(&key) {
            if last.elapsed() < self.dedup_window {
                return false;
            }
        }
        alerts.insert(key, Instant::now());
        alerts.retain(|_, time| time.elapsed() < self.dedup_window);
        true
    }

    /// Build an Alertmanager alert for a violation
    pub fn to_alertmanager_alert(&self, violation: &Violation) -> AlertmanagerAlert {
        let alertname = match violation.violation_type {
            ViolationType::Cpu => "TenantCPUViolation",
            ViolationType::Memory => "TenantMemoryViolation",
            ViolationType::Thread => "TenantThreadViolation",
            ViolationType::CrossTenantPerformance => "TenantIsolationBreach",
        };
        let severity = match violation.severity {
            Severity::Critical => "critical",
            Severity::High | Severity::Medium | Severity::Low => "warning",
        };

        let mut labels = HashMap::new();
        labels.insert("alertname".to_string(), alertname.to_string());
        labels.insert("severity".to_string(), severity.to_string());
        labels.insert("tenant".to_string(), violation.tenant_id.clone());
        labels.insert("node".to_string(), self.node_name.clone());
        labels.insert(
            "violation_type".to_string(),
            violation.violation_type.to_string(),
        );

        let mut annotations = HashMap::new();
        annotations.insert(
            "summary".to_string(),
            format!(
                "{} violation for tenant {}",
                violation.violation_type, violation.tenant_id
            ),
        );
        annotations.insert(
            "description".to_string(),
            format!(
                "Measured {:.2} against threshold {:.2} ({} severity).",
                violation.measured_value, violation.threshold_value, violation.severity
            ),
        );
        for (key, value) in &violation.details {
            annotations.insert(key.clone(), value.to_string());
        }

        let secs = violation.timestamp.trunc() as i64;
        let nanos = (violation.timestamp.fract() * 1e9) as u32;
        let starts_at = chrono::DateTime::from_timestamp(secs, nanos)
            .unwrap_or_else(chrono::Utc::now)
            .to_rfc3339();

        AlertmanagerAlert {
            status: "firing".to_string(),
            labels,
            annotations,
            starts_at,
            ends_at: None,
        }
    }

    pub fn create_alertmanager_payload(alerts: Vec<AlertmanagerAlert>) -> AlertmanagerPayload {
        AlertmanagerPayload { alerts }
    }

    /// Clear expired deduplication entries
    pub fn cleanup_dedup_cache(&self) {
        let mut alerts = self.recent_alerts.write().unwrap_or_else(|e| e.into_inner());
        alerts.retain(|_, time| time.elapsed() < self.dedup_window);
    }
}
