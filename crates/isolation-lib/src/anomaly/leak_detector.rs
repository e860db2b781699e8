//! Baseline-relative resource leak detection
//!
//! A baseline is the average of the samples captured during a
//! stabilization period. A leak is sustained growth of the recent
//! average past an absolute or relative threshold. The least-squares
//! growth rate over the recent samples is reported alongside.

use crate::models::{
    now_timestamp, Severity, SeverityTiers, TenantBaseline, Violation,
    ViolationType,
};
use crate::monitor::ResourceMonitor;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for leak detection
#[derive(Debug, Clone)]
pub struct LeakDetectorConfig {
    /// Trailing window used as the tenant's current level (default: 10 seconds)
    pub recent_window: Duration,
    /// Upper bound on how long `establish_baseline` may wait (default: 5 minutes)
    pub max_stabilization: Duration,
    pub tiers: SeverityTiers,
}

impl Default for LeakDetectorConfig {
    fn default() -> Self {
        Self {
            recent_window: Duration::from_secs(10),
            max_stabilization: Duration::from_secs(300),
            tiers: SeverityTiers::default(),
        }
    }
}

/// Why a leak check did or did not evaluate growth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeakCheckStatus {
    Evaluated,
    NoBaseline,
    NoRecentSamples,
}

/// Result of a single-tenant memory leak check
#[derive(Debug, Clone, Serialize)]
pub struct LeakCheck {
    pub tenant_id: String,
    pub leak_detected: bool,
    pub status: LeakCheckStatus,
    pub baseline_memory_mb: f64,
    pub current_memory_mb: f64,
    pub growth_mb: f64,
    /// None when the baseline is zero
    pub growth_percent: Option<f64>,
    pub exceeds_absolute: bool,
    pub exceeds_percent: bool,
    /// Least-squares slope over the recent samples
    pub growth_rate_mb_per_sec: f64,
    pub samples_analyzed: usize,
}

impl LeakCheck {
    fn not_evaluated(tenant_id: &str, status: LeakCheckStatus) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            leak_detected: false,
            status,
            baseline_memory_mb: 0.0,
            current_memory_mb: 0.0,
            growth_mb: 0.0,
            growth_percent: None,
            exceeds_absolute: false,
            exceeds_percent: false,
            growth_rate_mb_per_sec: 0.0,
            samples_analyzed: 0,
        }
    }
}

/// Detects sustained growth relative to per-tenant baselines
pub struct ResourceLeakDetector {
    monitor: Arc<ResourceMonitor>,
    config: LeakDetectorConfig,
    baselines: RwLock<HashMap<String, TenantBaseline>>,
}

impl ResourceLeakDetector {
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self::with_config(monitor, LeakDetectorConfig::default())
    }

    pub fn with_config(monitor: Arc<ResourceMonitor>, config: LeakDetectorConfig) -> Self {
        Self {
            monitor,
            config,
            baselines: RwLock::new(HashMap::new()),
        }
    }

    /// Wait out the stabilization period, then record the average of the
    /// samples taken during it as the tenant's baseline
    ///
    /// Replaces any earlier baseline. If nothing was sampled during the
    /// period the retained history is used instead; a tenant with no
    /// samples at all keeps its previous baseline and `None` is returned.
    /// Dropping the future before it completes leaves baselines untouched.
    pub async fn establish_baseline(
        &self,
        tenant_id: &str,
        stabilization: Duration,
    ) -> Option<TenantBaseline> {
        let stabilization = stabilization.min(self.config.max_stabilization);
        let started_at = now_timestamp();
        tokio::time::sleep(stabilization).await;

        let mut samples = self.monitor.snapshots_since(tenant_id, started_at);
        if samples.is_empty() {
            debug!(tenant_id = %tenant_id, "No samples during stabilization, using retained history");
            samples = self.monitor.history(tenant_id);
        }

        let Some(baseline) = TenantBaseline::from_snapshots(tenant_id, &samples) else {
            warn!(tenant_id = %tenant_id, "Cannot establish baseline without samples");
            return None;
        };

        info!(
            tenant_id = %tenant_id,
            baseline_cpu = baseline.baseline_cpu,
            baseline_memory_mb = baseline.baseline_memory_mb,
            samples = baseline.sample_count,
            "Leak baseline established"
        );
        self.baselines
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tenant_id.to_string(), baseline.clone());
        Some(baseline)
    }

    pub fn baseline(&self, tenant_id: &str) -> Option<TenantBaseline> {
        self.baselines
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(tenant_id)
            .cloned()
    }

    pub fn clear_baseline(&self, tenant_id: &str) -> bool {
        self.baselines
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(tenant_id)
            .is_some()
    }

    /// Compare the tenant's recent memory average against its baseline
    ///
    /// A leak is flagged when absolute growth exceeds `growth_threshold_mb`
    /// or relative growth exceeds `growth_threshold_percent`. A zero
    /// baseline disables the relative check.
    pub fn check_for_leak(
        &self,
        tenant_id: &str,
        growth_threshold_mb: f64,
        growth_threshold_percent: f64,
    ) -> LeakCheck {
        let Some(baseline) = self.baseline(tenant_id) else {
            return LeakCheck::not_evaluated(tenant_id, LeakCheckStatus::NoBaseline);
        };

        let samples = self
            .monitor
            .snapshots(tenant_id, self.config.recent_window.as_secs_f64());
        if samples.is_empty() {
            let mut check = LeakCheck::not_evaluated(tenant_id, LeakCheckStatus::NoRecentSamples);
            check.baseline_memory_mb = baseline.baseline_memory_mb;
            return check;
        }

        let current = samples.iter().map(|s| s.memory_mb).sum::<f64>() / samples.len() as f64;
        let growth_mb = current - baseline.baseline_memory_mb;
        let growth_percent = relative_growth(growth_mb, baseline.baseline_memory_mb);

        let exceeds_absolute = growth_mb > growth_threshold_mb;
        let exceeds_percent = growth_percent
            .map(|p| p > growth_threshold_percent)
            .unwrap_or(false);

        let points: Vec<(f64, f64)> = samples.iter().map(|s| (s.timestamp, s.memory_mb)).collect();
        let check = LeakCheck {
            tenant_id: tenant_id.to_string(),
            leak_detected: exceeds_absolute || exceeds_percent,
            status: LeakCheckStatus::Evaluated,
            baseline_memory_mb: baseline.baseline_memory_mb,
            current_memory_mb: current,
            growth_mb,
            growth_percent,
            exceeds_absolute,
            exceeds_percent,
            growth_rate_mb_per_sec: linear_regression_slope(&points),
            samples_analyzed: samples.len(),
        };

        if check.leak_detected {
            let severity = growth_percent
                .map(|p| self.config.tiers.classify(p))
                .unwrap_or(Severity::High);
            let violation = Violation::new(
                tenant_id,
                ViolationType::Memory,
                current,
                baseline.baseline_memory_mb + growth_threshold_mb,
                severity,
            )
            .with_detail("source", "leak_detector")
            .with_detail("baseline_memory_mb", baseline.baseline_memory_mb)
            .with_detail("growth_mb", growth_mb)
            .with_detail("growth_percent", growth_percent)
            .with_detail("growth_rate_mb_per_sec", check.growth_rate_mb_per_sec);
            self.monitor.report_violation(violation);
        }

        check
    }

    /// Check every tenant with a baseline for growth in CPU, memory or threads
    ///
    /// Returns the tenants whose recent average grew past any threshold;
    /// one violation is reported per exceeded dimension.
    pub fn detect_all_leaks(
        &self,
        cpu_threshold: f64,
        memory_threshold_mb: f64,
        thread_threshold: f64,
    ) -> BTreeSet<String> {
        let baselines: Vec<TenantBaseline> = self
            .baselines
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        let window = self.config.recent_window.as_secs_f64();
        let mut leaking = BTreeSet::new();

        for baseline in baselines {
            let summary = self.monitor.get_tenant_summary(&baseline.tenant_id, window);
            if !summary.has_data() {
                continue;
            }

            let dimensions = [
                (
                    ViolationType::Cpu,
                    summary.avg_cpu_percent,
                    baseline.baseline_cpu,
                    cpu_threshold,
                ),
                (
                    ViolationType::Memory,
                    summary.avg_memory_mb,
                    baseline.baseline_memory_mb,
                    memory_threshold_mb,
                ),
                (
                    ViolationType::Thread,
                    summary.avg_thread_count,
                    baseline.baseline_threads,
                    thread_threshold,
                ),
            ];

            for (violation_type, current, base, threshold) in dimensions {
                let growth = current - base;
                if growth <= threshold {
                    continue;
                }
                leaking.insert(baseline.tenant_id.clone());
                let severity = relative_growth(growth, base)
                    .map(|p| self.config.tiers.classify(p))
                    .unwrap_or(Severity::High);
                self.monitor.report_violation(
                    Violation::new(
                        &baseline.tenant_id,
                        violation_type,
                        current,
                        base + threshold,
                        severity,
                    )
                    .with_detail("source", "leak_detector")
                    .with_detail("baseline", base)
                    .with_detail("growth", growth),
                );
            }
        }

        if !leaking.is_empty() {
            info!(tenants = ?leaking, "Resource growth detected");
        }
        leaking
    }
}

/// Growth as a percentage of the baseline; undefined for a zero baseline
fn relative_growth(growth: f64, baseline: f64) -> Option<f64> {
    if baseline.abs() < f64::EPSILON {
        None
    } else {
        Some(growth / baseline * 100.0)
    }
}

/// Least-squares slope of (timestamp, value) points, in units per second
fn linear_regression_slope(points: &[(f64, f64)]) -> f64 {
    let n = points.len() as f64;
    if n < 2.0 {
        return 0.0;
    }

    // Normalize timestamps to avoid precision issues
    let t0 = points[0].0;

    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;

    for (ts, value) in points {
        let x = ts - t0;
        sum_x += x;
        sum_y += value;
        sum_xy += x * value;
        sum_xx += x * x;
    }

    let denominator = n * sum_xx - sum_x * sum_x;
    if denominator.abs() < f64::EPSILON {
        return 0.0;
    }

    (n * sum_xy - sum_x * sum_y) / denominator
}
