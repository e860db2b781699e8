//! Synthetic process with settable readings
//!
//! Reports a base reading plus the sum of named contributions, so
//! several simulated agents can load the same tenant independently.

use super::{async_trait, ProcessStats, ProcessStatsProvider};
use crate::error::StatsError;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct SyntheticState {
    base: ProcessStats,
    contributions: HashMap<String, ProcessStats>,
    failing: bool,
}

/// In-memory stand-in for an OS process
#[derive(Debug)]
pub struct SyntheticProcess {
    name: String,
    state: Mutex<SyntheticState>,
}

impl SyntheticProcess {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(SyntheticState::default()),
        }
    }

    /// Create with an initial base reading
    pub fn with_base(name: impl Into<String>, base: ProcessStats) -> Self {
        let process = Self::new(name);
        process.set_base(base);
        process
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SyntheticState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_base(&self, base: ProcessStats) {
        self.state().base = base;
    }

    pub fn set_cpu(&self, cpu_percent: f64) {
        self.state().base.cpu_percent = cpu_percent;
    }

    pub fn set_memory(&self, memory_mb: f64) {
        self.state().base.memory_mb = memory_mb;
    }

    pub fn set_threads(&self, thread_count: u32) {
        self.state().base.thread_count = thread_count;
    }

    /// Set or replace the load attributed to `source`
    pub fn set_contribution(&self, source: &str, load: ProcessStats) {
        self.state().contributions.insert(source.to_string(), load);
    }

    pub fn clear_contribution(&self, source: &str) {
        self.state().contributions.remove(source);
    }

    /// Make subsequent samples fail as if the process had exited
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Reading the monitor would observe right now
    pub fn current(&self) -> ProcessStats {
        let state = self.state();
        state
            .contributions
            .values()
            .fold(state.base, |acc, c| ProcessStats {
                cpu_percent: acc.cpu_percent + c.cpu_percent,
                memory_mb: acc.memory_mb + c.memory_mb,
                thread_count: acc.thread_count.saturating_add(c.thread_count),
                fd_count: acc.fd_count.saturating_add(c.fd_count),
            })
    }
}

#[async_trait]
impl ProcessStatsProvider for SyntheticProcess {
    async fn sample(&self) -> Result<ProcessStats, StatsError> {
        if self.state().failing {
            return Err(StatsError::ProcessNotFound {
                process: self.describe(),
            });
        }
        Ok(self.current())
    }

    fn describe(&self) -> String {
        format!("synthetic {}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_contributions_are_summed() {
        let process = SyntheticProcess::with_base(
            "t1",
            ProcessStats {
                cpu_percent: 5.0,
                memory_mb: 100.0,
                thread_count: 2,
                fd_count: 8,
            },
        );
        process.set_contribution(
            "agent-1",
            ProcessStats {
                cpu_percent: 20.0,
                memory_mb: 50.0,
                thread_count: 1,
                fd_count: 2,
            },
        );
        process.set_contribution(
            "agent-2",
            ProcessStats {
                cpu_percent: 10.0,
                ..Default::default()
            },
        );

        let stats = process.sample().await.unwrap();
        assert!((stats.cpu_percent - 35.0).abs() < 1e-9);
        assert!((stats.memory_mb - 150.0).abs() < 1e-9);
        assert_eq!(stats.thread_count, 3);

        process.clear_contribution("agent-1");
        let stats = process.sample().await.unwrap();
        assert!((stats.cpu_percent - 15.0).abs() < 1e-9);
        assert!((stats.memory_mb - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_counts_saturate() {
        let process = SyntheticProcess::with_base(
            "t1",
            ProcessStats {
                thread_count: u32::MAX - 1,
                fd_count: u32::MAX,
                ..Default::default()
            },
        );
        process.set_contribution(
            "agent-1",
            ProcessStats {
                thread_count: 5,
                fd_count: 5,
                ..Default::default()
            },
        );

        let stats = process.current();
        assert_eq!(stats.thread_count, u32::MAX);
        assert_eq!(stats.fd_count, u32::MAX);
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let process = SyntheticProcess::new("t1");
        process.set_failing(true);
        assert!(matches!(
            process.sample().await,
            Err(StatsError::ProcessNotFound { .. })
        ));

        process.set_failing(false);
        assert!(process.sample().await.is_ok());
    }
}
