//! Quota checks against recent average usage
//!
//! The `enforce_*` checks are pure reads: they report whether a tenant is
//! within its quota and nothing else. `enforce_all` evaluates every
//! registered policy and reports the breaches as violations.

use crate::models::{QuotaPolicy, Severity, SeverityTiers, Violation, ViolationType};
use crate::monitor::ResourceMonitor;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct QuotaConfig {
    /// Trailing window averaged for enforcement (default: 10 seconds)
    pub recent_window: Duration,
    /// Severity tiers applied to the overage percentage
    pub tiers: SeverityTiers,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            recent_window: Duration::from_secs(10),
            tiers: SeverityTiers::default(),
        }
    }
}

/// Outcome of evaluating one tenant against its policy
#[derive(Debug, Clone, Serialize)]
pub struct QuotaEvaluation {
    pub tenant_id: String,
    pub sample_count: usize,
    pub avg_cpu_percent: f64,
    pub avg_memory_mb: f64,
    pub cpu_within_quota: bool,
    pub memory_within_quota: bool,
    pub violations: Vec<Violation>,
}

impl QuotaEvaluation {
    pub fn within_quota(&self) -> bool {
        self.cpu_within_quota && self.memory_within_quota
    }
}

pub struct QuotaEnforcer {
    monitor: Arc<ResourceMonitor>,
    config: QuotaConfig,
    policies: DashMap<String, QuotaPolicy>,
}

impl QuotaEnforcer {
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self::with_config(monitor, QuotaConfig::default())
    }

    pub fn with_config(monitor: Arc<ResourceMonitor>, config: QuotaConfig) -> Self {
        Self {
            monitor,
            config,
            policies: DashMap::new(),
        }
    }

    /// True unless the recent average CPU is strictly above the quota
    ///
    /// A tenant with no recent samples is within quota.
    pub fn enforce_cpu_quota(&self, tenant_id: &str, quota_percent: f64) -> bool {
        let summary = self
            .monitor
            .get_tenant_summary(tenant_id, self.config.recent_window.as_secs_f64());
        !(summary.has_data() && summary.avg_cpu_percent > quota_percent)
    }

    /// True unless the recent average memory is strictly above the quota
    pub fn enforce_memory_quota(&self, tenant_id: &str, quota_mb: f64) -> bool {
        let summary = self
            .monitor
            .get_tenant_summary(tenant_id, self.config.recent_window.as_secs_f64());
        !(summary.has_data() && summary.avg_memory_mb > quota_mb)
    }

    /// Register or replace a tenant's policy
    pub fn set_policy(&self, policy: QuotaPolicy) {
        debug!(tenant_id = %policy.tenant_id, "Quota policy set");
        self.policies.insert(policy.tenant_id.clone(), policy);
    }

    pub fn remove_policy(&self, tenant_id: &str) -> Option<QuotaPolicy> {
        self.policies.remove(tenant_id).map(|(_, p)| p)
    }

    pub fn policies(&self) -> Vec<QuotaPolicy> {
        let mut policies: Vec<QuotaPolicy> =
            self.policies.iter().map(|e| e.value().clone()).collect();
        policies.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        policies
    }

    /// Evaluate a policy without reporting anything
    pub fn evaluate(&self, policy: &QuotaPolicy) -> QuotaEvaluation {
        let summary = self
            .monitor
            .get_tenant_summary(&policy.tenant_id, self.config.recent_window.as_secs_f64());

        let mut evaluation = QuotaEvaluation {
            tenant_id: policy.tenant_id.clone(),
            sample_count: summary.sample_count,
            avg_cpu_percent: summary.avg_cpu_percent,
            avg_memory_mb: summary.avg_memory_mb,
            cpu_within_quota: true,
            memory_within_quota: true,
            violations: Vec::new(),
        };
        if !summary.has_data() {
            return evaluation;
        }

        if summary.avg_cpu_percent > policy.cpu_quota_percent {
            evaluation.cpu_within_quota = false;
            evaluation.violations.push(self.quota_violation(
                policy,
                ViolationType::Cpu,
                summary.avg_cpu_percent,
                policy.cpu_quota_percent,
            ));
        }
        if summary.avg_memory_mb > policy.memory_quota_mb {
            evaluation.memory_within_quota = false;
            evaluation.violations.push(self.quota_violation(
                policy,
                ViolationType::Memory,
                summary.avg_memory_mb,
                policy.memory_quota_mb,
            ));
        }

        evaluation
    }

    /// Evaluate every registered policy and report each breach
    pub fn enforce_all(&self) -> Vec<QuotaEvaluation> {
        let evaluations: Vec<QuotaEvaluation> =
            self.policies().iter().map(|p| self.evaluate(p)).collect();

        let mut breaches = 0;
        for evaluation in &evaluations {
            for violation in &evaluation.violations {
                breaches += 1;
                self.monitor.report_violation(violation.clone());
            }
        }
        if breaches > 0 {
            info!(
                policies = evaluations.len(),
                breaches = breaches,
                "Quota enforcement pass found breaches"
            );
        }
        evaluations
    }

    fn quota_violation(
        &self,
        policy: &QuotaPolicy,
        violation_type: ViolationType,
        measured: f64,
        quota: f64,
    ) -> Violation {
        let severity = if quota > 0.0 {
            self.config.tiers.classify((measured - quota) / quota * 100.0)
        } else {
            Severity::Critical
        };
        Violation::new(&policy.tenant_id, violation_type, measured, quota, severity)
            .with_detail("source", "quota")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{ProcessStats, SyntheticProcess};
    use crate::monitor::ResourceMonitorBuilder;

    async fn monitored(cpu: f64, memory_mb: f64) -> (Arc<ResourceMonitor>, QuotaEnforcer) {
        let monitor = Arc::new(ResourceMonitorBuilder::new().build());
        monitor.register_process(
            "t1",
            Arc::new(SyntheticProcess::with_base(
                "t1",
                ProcessStats {
                    cpu_percent: cpu,
                    memory_mb,
                    thread_count: 1,
                    fd_count: 1,
                },
            )),
        );
        for _ in 0..3 {
            monitor.sample_once().await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let enforcer = QuotaEnforcer::new(monitor.clone());
        (monitor, enforcer)
    }

    #[tokio::test]
    async fn test_quota_boundary_is_within() {
        let (_monitor, enforcer) = monitored(50.0, 256.0).await;

        assert!(enforcer.enforce_cpu_quota("t1", 50.0));
        assert!(!enforcer.enforce_cpu_quota("t1", 49.9));
        assert!(enforcer.enforce_memory_quota("t1", 256.0));
        assert!(!enforcer.enforce_memory_quota("t1", 255.0));
    }

    #[tokio::test]
    async fn test_no_samples_is_within_quota() {
        let monitor = Arc::new(ResourceMonitorBuilder::new().build());
        let enforcer = QuotaEnforcer::new(monitor);
        assert!(enforcer.enforce_cpu_quota("nobody", 0.0));
        assert!(enforcer.enforce_memory_quota("nobody", 0.0));
    }

    #[tokio::test]
    async fn test_enforce_checks_do_not_report() {
        let (monitor, enforcer) = monitored(90.0, 10.0).await;
        assert!(!enforcer.enforce_cpu_quota("t1", 10.0));
        assert!(monitor.violations().is_empty());
    }

    #[tokio::test]
    async fn test_evaluate_and_enforce_all() {
        let (monitor, enforcer) = monitored(60.0, 300.0).await;
        enforcer.set_policy(QuotaPolicy {
            tenant_id: "t1".to_string(),
            cpu_quota_percent: 40.0,
            memory_quota_mb: 512.0,
        });
        enforcer.set_policy(QuotaPolicy {
            tenant_id: "idle".to_string(),
            cpu_quota_percent: 1.0,
            memory_quota_mb: 64.0,
        });

        let evaluation = enforcer.evaluate(&enforcer.policies()[1]);
        assert_eq!(evaluation.tenant_id, "t1");
        assert!(!evaluation.cpu_within_quota);
        assert!(evaluation.memory_within_quota);
        assert_eq!(evaluation.violations[0].severity, Severity::Critical);
        assert!(monitor.violations().is_empty());

        let evaluations = enforcer.enforce_all();
        assert_eq!(evaluations.len(), 2);
        assert!(evaluations[0].within_quota());
        assert_eq!(monitor.violations_for("t1").len(), 1);

        assert!(enforcer.remove_policy("t1").is_some());
        assert_eq!(enforcer.policies().len(), 1);
    }
}
