//! Cross-tenant performance isolation checks
//!
//! Baselines are captured for a group of tenants while a suspected
//! noisy neighbour is quiet. When the neighbour becomes active, each
//! target's recent CPU and memory are compared against its baseline and
//! degradation beyond the threshold is reported as an isolation breach.

use crate::models::{now_timestamp, SeverityTiers, TenantBaseline, Violation, ViolationType};
use crate::monitor::ResourceMonitor;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct IsolationConfig {
    /// Trailing window used as a target's current level (default: 10 seconds)
    pub recent_window: Duration,
    /// Upper bound on a baseline period (default: 5 minutes)
    pub max_baseline_duration: Duration,
    /// Degradation percentage used when the caller has no opinion (default: 10)
    pub default_threshold_percent: f64,
    pub tiers: SeverityTiers,
    /// Score points lost per recorded violation (default: 10)
    pub violation_weight: f64,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            recent_window: Duration::from_secs(10),
            max_baseline_duration: Duration::from_secs(300),
            default_threshold_percent: 10.0,
            tiers: SeverityTiers::default(),
            violation_weight: 10.0,
        }
    }
}

pub struct PerformanceIsolationValidator {
    monitor: Arc<ResourceMonitor>,
    config: IsolationConfig,
    baselines: RwLock<HashMap<String, TenantBaseline>>,
}

impl PerformanceIsolationValidator {
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self::with_config(monitor, IsolationConfig::default())
    }

    pub fn with_config(monitor: Arc<ResourceMonitor>, config: IsolationConfig) -> Self {
        Self {
            monitor,
            config,
            baselines: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &IsolationConfig {
        &self.config
    }

    /// Observe the given tenants for `duration` and record a baseline for each
    ///
    /// Tenants with no samples at all are left out of the result and keep
    /// any baseline they already had.
    pub async fn establish_performance_baseline<S: AsRef<str>>(
        &self,
        tenant_ids: &[S],
        duration: Duration,
    ) -> HashMap<String, TenantBaseline> {
        let duration = duration.min(self.config.max_baseline_duration);
        let started_at = now_timestamp();
        tokio::time::sleep(duration).await;

        let mut established = HashMap::new();
        for tenant_id in tenant_ids {
            let tenant_id = tenant_id.as_ref();
            let mut samples = self.monitor.snapshots_since(tenant_id, started_at);
            if samples.is_empty() {
                samples = self.monitor.history(tenant_id);
            }
            match TenantBaseline::from_snapshots(tenant_id, &samples) {
                Some(baseline) => {
                    established.insert(tenant_id.to_string(), baseline);
                }
                None => warn!(tenant_id = %tenant_id, "No samples for performance baseline"),
            }
        }

        info!(tenants = established.len(), "Performance baselines established");
        self.baselines
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend(established.clone());
        established
    }

    pub fn baselines(&self) -> HashMap<String, TenantBaseline> {
        self.baselines
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Compare each target's recent usage to its baseline
    ///
    /// A target is flagged when the larger of its CPU and memory
    /// degradation percentages exceeds `threshold_percent`. Targets without
    /// a baseline or recent samples are skipped, as is the source itself.
    pub fn detect_cross_tenant_impact<S: AsRef<str>>(
        &self,
        source_tenant: &str,
        target_tenants: &[S],
        threshold_percent: f64,
    ) -> Vec<Violation> {
        let baselines = self.baselines();
        let window = self.config.recent_window.as_secs_f64();
        let mut violations = Vec::new();

        for target in target_tenants {
            let target = target.as_ref();
            if target == source_tenant {
                continue;
            }
            let Some(baseline) = baselines.get(target) else {
                debug!(tenant_id = %target, "No baseline, skipping impact check");
                continue;
            };
            let summary = self.monitor.get_tenant_summary(target, window);
            if !summary.has_data() {
                debug!(tenant_id = %target, "No recent samples, skipping impact check");
                continue;
            }

            let cpu_degradation = degradation(summary.avg_cpu_percent, baseline.baseline_cpu);
            let memory_degradation =
                degradation(summary.avg_memory_mb, baseline.baseline_memory_mb);
            let Some(worst) = [cpu_degradation, memory_degradation]
                .into_iter()
                .flatten()
                .reduce(f64::max)
            else {
                continue;
            };

            if worst > threshold_percent {
                let violation = Violation::new(
                    target,
                    ViolationType::CrossTenantPerformance,
                    worst,
                    threshold_percent,
                    self.config.tiers.classify(worst),
                )
                .with_detail("source_tenant", source_tenant)
                .with_detail("cpu_degradation_percent", cpu_degradation)
                .with_detail("memory_degradation_percent", memory_degradation)
                .with_detail("baseline_cpu", baseline.baseline_cpu)
                .with_detail("current_cpu", summary.avg_cpu_percent)
                .with_detail("baseline_memory_mb", baseline.baseline_memory_mb)
                .with_detail("current_memory_mb", summary.avg_memory_mb);

                self.monitor.report_violation(violation.clone());
                violations.push(violation);
            }
        }

        if !violations.is_empty() {
            warn!(
                source_tenant = %source_tenant,
                affected = violations.len(),
                "Cross-tenant performance impact detected"
            );
        }
        violations
    }

    /// Same as `detect_cross_tenant_impact` using the configured default threshold
    pub fn detect_cross_tenant_impact_default<S: AsRef<str>>(
        &self,
        source_tenant: &str,
        target_tenants: &[S],
    ) -> Vec<Violation> {
        self.detect_cross_tenant_impact(
            source_tenant,
            target_tenants,
            self.config.default_threshold_percent,
        )
    }

    /// Score in [0, 100] per tenant from the number of recorded violations
    pub fn isolation_score<S: AsRef<str>>(&self, tenant_ids: &[S]) -> HashMap<String, f64> {
        tenant_ids
            .iter()
            .map(|t| {
                let t = t.as_ref();
                let penalty = self.monitor.violations_for(t).len() as f64 * self.config.violation_weight;
                (t.to_string(), (100.0 - penalty).max(0.0))
            })
            .collect()
    }
}

/// Percentage increase over the baseline; undefined for a zero baseline
fn degradation(current: f64, baseline: f64) -> Option<f64> {
    if baseline.abs() < f64::EPSILON {
        None
    } else {
        Some((current - baseline) / baseline * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{ProcessStats, SyntheticProcess};
    use crate::models::Severity;
    use crate::monitor::ResourceMonitorBuilder;

    fn process(cpu: f64, memory_mb: f64) -> Arc<SyntheticProcess> {
        Arc::new(SyntheticProcess::with_base(
            "tenant",
            ProcessStats {
                cpu_percent: cpu,
                memory_mb,
                thread_count: 2,
                fd_count: 8,
            },
        ))
    }

    async fn sample_n(monitor: &ResourceMonitor, n: usize) {
        for _ in 0..n {
            monitor.sample_once().await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    fn validator(monitor: Arc<ResourceMonitor>) -> PerformanceIsolationValidator {
        PerformanceIsolationValidator::with_config(
            monitor,
            IsolationConfig {
                recent_window: Duration::from_millis(200),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_degradation() {
        assert_eq!(degradation(120.0, 100.0), Some(20.0));
        assert_eq!(degradation(80.0, 100.0), Some(-20.0));
        assert_eq!(degradation(5.0, 0.0), None);
    }

    #[tokio::test]
    async fn test_unchanged_usage_yields_no_violation() {
        let monitor = Arc::new(ResourceMonitorBuilder::new().build());
        monitor.register_process("a", process(20.0, 100.0));
        monitor.register_process("b", process(30.0, 200.0));
        let validator = validator(monitor.clone());

        sample_n(&monitor, 3).await;
        let baselines = validator
            .establish_performance_baseline(&["a", "b"], Duration::from_millis(1))
            .await;
        assert_eq!(baselines.len(), 2);

        sample_n(&monitor, 2).await;
        assert!(validator
            .detect_cross_tenant_impact("a", &["b"], 0.0)
            .is_empty());
        assert!(monitor.violations().is_empty());
    }

    #[tokio::test]
    async fn test_degraded_target_flagged_with_severity() {
        let monitor = Arc::new(ResourceMonitorBuilder::new().build());
        let target = process(20.0, 100.0);
        monitor.register_process("noisy", process(10.0, 50.0));
        monitor.register_process("victim", target.clone());
        let validator = validator(monitor.clone());

        sample_n(&monitor, 3).await;
        validator
            .establish_performance_baseline(&["victim"], Duration::from_millis(1))
            .await;

        tokio::time::sleep(Duration::from_millis(250)).await;
        target.set_cpu(26.0); // +30%
        target.set_memory(110.0); // +10%
        sample_n(&monitor, 2).await;

        let violations = validator.detect_cross_tenant_impact("noisy", &["victim"], 10.0);
        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.tenant_id, "victim");
        assert_eq!(v.violation_type, ViolationType::CrossTenantPerformance);
        assert_eq!(v.severity, Severity::High);
        assert!((v.measured_value - 30.0).abs() < 1e-6);
        assert_eq!(v.details["source_tenant"], "noisy");
        assert_eq!(monitor.violations_for("victim").len(), 1);
    }

    #[tokio::test]
    async fn test_missing_baseline_and_source_skipped() {
        let monitor = Arc::new(ResourceMonitorBuilder::new().build());
        monitor.register_process("a", process(20.0, 100.0));
        monitor.register_process("b", process(20.0, 100.0));
        let validator = validator(monitor.clone());
        sample_n(&monitor, 2).await;

        validator
            .establish_performance_baseline(&["a", "ghost"], Duration::from_millis(1))
            .await;
        assert!(validator.baselines().contains_key("a"));
        assert!(!validator.baselines().contains_key("ghost"));

        assert!(validator
            .detect_cross_tenant_impact("a", &["a", "b", "ghost"], -100.0)
            .is_empty());
    }

    #[tokio::test]
    async fn test_zero_baseline_dimension_ignored() {
        let monitor = Arc::new(ResourceMonitorBuilder::new().build());
        let target = process(0.0, 100.0);
        monitor.register_process("t", target.clone());
        let validator = validator(monitor.clone());
        sample_n(&monitor, 2).await;
        validator
            .establish_performance_baseline(&["t"], Duration::from_millis(1))
            .await;

        tokio::time::sleep(Duration::from_millis(250)).await;
        target.set_cpu(80.0);
        sample_n(&monitor, 2).await;

        assert!(validator
            .detect_cross_tenant_impact("s", &["t"], 10.0)
            .is_empty());
    }

    #[tokio::test]
    async fn test_isolation_score() {
        let monitor = Arc::new(ResourceMonitorBuilder::new().build());
        let validator = validator(monitor.clone());
        for _ in 0..3 {
            monitor.report_violation(Violation::new(
                "bad",
                ViolationType::Memory,
                1.0,
                0.0,
                Severity::Low,
            ));
        }
        for _ in 0..12 {
            monitor.report_violation(Violation::new(
                "worse",
                ViolationType::Cpu,
                1.0,
                0.0,
                Severity::Low,
            ));
        }

        let scores = validator.isolation_score(&["good", "bad", "worse"]);
        assert_eq!(scores["good"], 100.0);
        assert_eq!(scores["bad"], 70.0);
        assert_eq!(scores["worse"], 0.0);
    }
}
