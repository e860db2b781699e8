//! Built-in static thresholds evaluated on every sample
//!
//! A limit must be exceeded for `sustained_samples` consecutive samples
//! before a critical violation fires. Each breach episode fires once;
//! the tenant has to drop back under the limit before it can fire again.

use crate::models::{ResourceSnapshot, Severity, Violation, ViolationType};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct StaticThresholds {
    pub cpu_critical_percent: f64,
    pub memory_critical_mb: Option<f64>,
    pub thread_critical_count: Option<u32>,
    pub sustained_samples: usize,
}

impl Default for StaticThresholds {
    fn default() -> Self {
        Self {
            cpu_critical_percent: 95.0,
            memory_critical_mb: None,
            thread_critical_count: None,
            sustained_samples: 3,
        }
    }
}

pub(crate) struct ThresholdTracker {
    limits: StaticThresholds,
    streaks: Mutex<HashMap<(String, ViolationType), usize>>,
}

impl ThresholdTracker {
    pub(crate) fn new(limits: StaticThresholds) -> Self {
        Self {
            limits,
            streaks: Mutex::new(HashMap::new()),
        }
    }

    /// Update streaks with a new snapshot, returning violations that fired
    pub(crate) fn observe(&self, snapshot: &ResourceSnapshot) -> Vec<Violation> {
        let sustained = self.limits.sustained_samples.max(1);
        let mut checks = vec![(
            ViolationType::Cpu,
            snapshot.cpu_percent,
            self.limits.cpu_critical_percent,
        )];
        if let Some(limit) = self.limits.memory_critical_mb {
            checks.push((ViolationType::Memory, snapshot.memory_mb, limit));
        }
        if let Some(limit) = self.limits.thread_critical_count {
            checks.push((
                ViolationType::Thread,
                snapshot.thread_count as f64,
                limit as f64,
            ));
        }

        let mut streaks = self.streaks.lock().unwrap_or_else(|e| e.into_inner());
        let mut fired = Vec::new();

        for (violation_type, measured, limit) in checks {
            let key = (snapshot.tenant_id.clone(), violation_type);
            if measured > limit {
                let streak = streaks.entry(key).or_insert(0);
                *streak += 1;
                if *streak == sustained {
                    fired.push(
                        Violation::new(
                            &snapshot.tenant_id,
                            violation_type,
                            measured,
                            limit,
                            Severity::Critical,
                        )
                        .with_detail("source", "static_threshold")
                        .with_detail("sustained_samples", sustained as u64),
                    );
                }
            } else {
                streaks.remove(&key);
            }
        }

        fired
    }

    pub(crate) fn forget(&self, tenant_id: &str) {
        let mut streaks = self.streaks.lock().unwrap_or_else(|e| e.into_inner());
        streaks.retain(|(tenant, _), _| tenant != tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(cpu: f64, mem: f64, threads: u32) -> ResourceSnapshot {
        ResourceSnapshot {
            timestamp: 0.0,
            tenant_id: "t1".to_string(),
            cpu_percent: cpu,
            memory_mb: mem,
            thread_count: threads,
            fd_count: 0,
        }
    }

    #[test]
    fn test_fires_once_per_sustained_breach() {
        let tracker = ThresholdTracker::new(StaticThresholds::default());

        assert!(tracker.observe(&snap(99.0, 10.0, 1)).is_empty());
        assert!(tracker.observe(&snap(99.0, 10.0, 1)).is_empty());
        let fired = tracker.observe(&snap(99.0, 10.0, 1));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].violation_type, ViolationType::Cpu);
        assert_eq!(fired[0].severity, Severity::Critical);

        // Still breaching: no repeat
        assert!(tracker.observe(&snap(99.0, 10.0, 1)).is_empty());

        // Recover, then breach again
        assert!(tracker.observe(&snap(10.0, 10.0, 1)).is_empty());
        for _ in 0..2 {
            assert!(tracker.observe(&snap(99.0, 10.0, 1)).is_empty());
        }
        assert_eq!(tracker.observe(&snap(99.0, 10.0, 1)).len(), 1);
    }

    #[test]
    fn test_interrupted_streak_does_not_fire() {
        let tracker = ThresholdTracker::new(StaticThresholds::default());
        tracker.observe(&snap(99.0, 0.0, 1));
        tracker.observe(&snap(99.0, 0.0, 1));
        tracker.observe(&snap(50.0, 0.0, 1));
        assert!(tracker.observe(&snap(99.0, 0.0, 1)).is_empty());
    }

    #[test]
    fn test_optional_memory_and_thread_limits() {
        let tracker = ThresholdTracker::new(StaticThresholds {
            cpu_critical_percent: 95.0,
            memory_critical_mb: Some(512.0),
            thread_critical_count: Some(100),
            sustained_samples: 1,
        });

        let fired = tracker.observe(&snap(10.0, 600.0, 150));
        let types: Vec<ViolationType> = fired.iter().map(|v| v.violation_type).collect();
        assert_eq!(types, vec![ViolationType::Memory, ViolationType::Thread]);
    }

    #[test]
    fn test_forget_resets_streaks() {
        let tracker = ThresholdTracker::new(StaticThresholds {
            sustained_samples: 2,
            ..Default::default()
        });
        tracker.observe(&snap(99.0, 0.0, 1));
        tracker.forget("t1");
        assert!(tracker.observe(&snap(99.0, 0.0, 1)).is_empty());
    }
}
