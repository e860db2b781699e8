//! Core data models for the isolation engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Instant;

/// Epoch-seconds clock that reads the wall clock once and then advances
/// on the monotonic clock
///
/// System clock steps (NTP corrections, VM resume) do not move it
/// backwards, so snapshot timestamps keep increasing.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    wall_anchor: f64,
    anchor: Instant,
}

impl AnchoredClock {
    pub fn new() -> Self {
        Self::anchored_at(chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0)
    }

    /// Clock whose current reading is `wall_anchor`
    pub fn anchored_at(wall_anchor: f64) -> Self {
        Self {
            wall_anchor,
            anchor: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.wall_anchor + self.anchor.elapsed().as_secs_f64()
    }
}

impl Default for AnchoredClock {
    fn default() -> Self {
        Self::new()
    }
}

static PROCESS_CLOCK: OnceLock<AnchoredClock> = OnceLock::new();

/// Current time as fractional seconds since the Unix epoch
///
/// Anchored to the wall clock on first use and monotonic afterwards.
pub fn now_timestamp() -> f64 {
    PROCESS_CLOCK.get_or_init(AnchoredClock::new).now()
}

/// Point-in-time measurement of one tenant's process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub timestamp: f64,
    pub tenant_id: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub thread_count: u32,
    pub fd_count: u32,
}

/// Aggregate statistics over a trailing window of snapshots
///
/// A tenant with no data yields the zero value with `sample_count == 0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TenantSummary {
    pub tenant_id: String,
    pub window_seconds: f64,
    pub sample_count: usize,
    pub avg_cpu_percent: f64,
    pub min_cpu_percent: f64,
    pub max_cpu_percent: f64,
    pub avg_memory_mb: f64,
    pub max_memory_mb: f64,
    pub avg_thread_count: f64,
    pub max_fd_count: u32,
}

impl TenantSummary {
    /// Zero-valued summary for a tenant without samples
    pub fn empty(tenant_id: impl Into<String>, window_seconds: f64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            window_seconds,
            ..Default::default()
        }
    }

    /// Build a summary from a slice of snapshots
    pub fn from_snapshots(
        tenant_id: impl Into<String>,
        window_seconds: f64,
        snapshots: &[ResourceSnapshot],
    ) -> Self {
        let mut summary = Self::empty(tenant_id, window_seconds);
        if snapshots.is_empty() {
            return summary;
        }

        let n = snapshots.len() as f64;
        summary.sample_count = snapshots.len();
        summary.min_cpu_percent = f64::MAX;
        summary.max_cpu_percent = f64::MIN;

        let mut cpu_sum = 0.0;
        let mut mem_sum = 0.0;
        let mut thread_sum = 0.0;

        for s in snapshots {
            cpu_sum += s.cpu_percent;
            mem_sum += s.memory_mb;
            thread_sum += s.thread_count as f64;
            summary.min_cpu_percent = summary.min_cpu_percent.min(s.cpu_percent);
            summary.max_cpu_percent = summary.max_cpu_percent.max(s.cpu_percent);
            summary.max_memory_mb = summary.max_memory_mb.max(s.memory_mb);
            summary.max_fd_count = summary.max_fd_count.max(s.fd_count);
        }

        summary.avg_cpu_percent = cpu_sum / n;
        summary.avg_memory_mb = mem_sum / n;
        summary.avg_thread_count = thread_sum / n;
        summary
    }

    pub fn has_data(&self) -> bool {
        self.sample_count > 0
    }
}

/// Reference measurement captured after a stabilization period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantBaseline {
    pub tenant_id: String,
    pub established_at: f64,
    pub baseline_cpu: f64,
    pub baseline_memory_mb: f64,
    pub baseline_threads: f64,
    pub sample_count: usize,
}

impl TenantBaseline {
    pub fn from_snapshots(tenant_id: &str, snapshots: &[ResourceSnapshot]) -> Option<Self> {
        if snapshots.is_empty() {
            return None;
        }
        let summary = TenantSummary::from_snapshots(tenant_id, 0.0, snapshots);
        Some(Self {
            tenant_id: tenant_id.to_string(),
            established_at: now_timestamp(),
            baseline_cpu: summary.avg_cpu_percent,
            baseline_memory_mb: summary.avg_memory_mb,
            baseline_threads: summary.avg_thread_count,
            sample_count: summary.sample_count,
        })
    }
}

/// Resource dimension a violation refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    Cpu,
    Memory,
    Thread,
    CrossTenantPerformance,
}

impl std::fmt::Display for ViolationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationType::Cpu => write!(f, "cpu"),
            ViolationType::Memory => write!(f, "memory"),
            ViolationType::Thread => write!(f, "thread"),
            ViolationType::CrossTenantPerformance => write!(f, "cross_tenant_performance"),
        }
    }
}

/// Violation severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Percentage boundaries separating severity tiers
///
/// Values below `medium` are low; `critical` and above are critical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityTiers {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl SeverityTiers {
    pub fn classify(&self, percent: f64) -> Severity {
        if percent >= self.critical {
            Severity::Critical
        } else if percent >= self.high {
            Severity::High
        } else if percent >= self.medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl Default for SeverityTiers {
    fn default() -> Self {
        Self {
            medium: 15.0,
            high: 25.0,
            critical: 50.0,
        }
    }
}

/// A threshold crossing detected by one of the analyzers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub tenant_id: String,
    pub violation_type: ViolationType,
    pub measured_value: f64,
    pub threshold_value: f64,
    pub severity: Severity,
    pub timestamp: f64,
    pub details: BTreeMap<String, serde_json::Value>,
}

impl Violation {
    pub fn new(
        tenant_id: impl Into<String>,
        violation_type: ViolationType,
        measured_value: f64,
        threshold_value: f64,
        severity: Severity,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            violation_type,
            measured_value,
            threshold_value,
            severity,
            timestamp: now_timestamp(),
            details: BTreeMap::new(),
        }
    }

    /// Attach a diagnostic detail
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Per-tenant quota configuration, read-only to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub tenant_id: String,
    pub cpu_quota_percent: f64,
    pub memory_quota_mb: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchored_clock_ignores_wall_clock_behind_anchor() {
        // An anchor an hour ahead of the system clock stands in for a clock
        // that stepped back after the anchor was taken
        let ahead = chrono::Utc::now().timestamp() as f64 + 3600.0;
        let clock = AnchoredClock::anchored_at(ahead);

        let first = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = clock.now();
        assert!(first >= ahead);
        assert!(second > first);
    }

    #[test]
    fn test_now_timestamp_is_monotonic() {
        let mut last = now_timestamp();
        for _ in 0..1000 {
            let next = now_timestamp();
            assert!(next >= last);
            last = next;
        }
    }

    fn snapshot(cpu: f64, mem: f64) -> ResourceSnapshot {
        ResourceSnapshot {
            timestamp: now_timestamp(),
            tenant_id: "t1".to_string(),
            cpu_percent: cpu,
            memory_mb: mem,
            thread_count: 4,
            fd_count: 12,
        }
    }

    #[test]
    fn test_summary_from_snapshots() {
        let snapshots = vec![snapshot(10.0, 100.0), snapshot(30.0, 200.0), snapshot(20.0, 150.0)];
        let summary = TenantSummary::from_snapshots("t1", 60.0, &snapshots);

        assert_eq!(summary.sample_count, 3);
        assert!((summary.avg_cpu_percent - 20.0).abs() < 1e-9);
        assert_eq!(summary.min_cpu_percent, 10.0);
        assert_eq!(summary.max_cpu_percent, 30.0);
        assert!((summary.avg_memory_mb - 150.0).abs() < 1e-9);
        assert_eq!(summary.max_memory_mb, 200.0);
        assert_eq!(summary.max_fd_count, 12);
    }

    #[test]
    fn test_empty_summary_is_zero_valued() {
        let summary = TenantSummary::from_snapshots("ghost", 60.0, &[]);
        assert_eq!(summary.sample_count, 0);
        assert_eq!(summary.avg_cpu_percent, 0.0);
        assert_eq!(summary.min_cpu_percent, 0.0);
        assert!(!summary.has_data());
    }

    #[test]
    fn test_severity_tiers() {
        let tiers = SeverityTiers::default();
        assert_eq!(tiers.classify(5.0), Severity::Low);
        assert_eq!(tiers.classify(15.0), Severity::Medium);
        assert_eq!(tiers.classify(24.9), Severity::Medium);
        assert_eq!(tiers.classify(25.0), Severity::High);
        assert_eq!(tiers.classify(50.0), Severity::Critical);
        assert!(Severity::Critical > Severity::Low);
    }

    #[test]
    fn test_violation_serializes_snake_case() {
        let v = Violation::new("t1", ViolationType::CrossTenantPerformance, 30.0, 10.0, Severity::High)
            .with_detail("source_tenant", "t2");
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["violation_type"], "cross_tenant_performance");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["details"]["source_tenant"], "t2");
    }
}
