//! Agent configuration

use anyhow::{bail, Context, Result};
use isolation_lib::anomaly::{LeakDetectorConfig, QuotaConfig};
use isolation_lib::monitor::{MonitorConfig, StaticThresholds};
use isolation_lib::QuotaPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Agent configuration, read from `AGENT_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name used in logs and alerts
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Sampling interval in milliseconds
    #[serde(default = "default_sample_interval")]
    pub sample_interval_ms: u64,

    /// Snapshots retained per tenant
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,

    #[serde(default = "default_cpu_critical")]
    pub cpu_critical_percent: f64,

    #[serde(default)]
    pub memory_critical_mb: Option<f64>,

    #[serde(default = "default_sustained_samples")]
    pub sustained_samples: usize,

    /// Repeat violations within this many seconds are not re-delivered (0 disables)
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    /// Wait before leak baselines are taken
    #[serde(default = "default_stabilization")]
    pub stabilization_secs: u64,

    /// Interval between leak and quota passes
    #[serde(default = "default_analysis_interval")]
    pub analysis_interval_secs: u64,

    /// Trailing window treated as "current" by the analyzers
    #[serde(default = "default_recent_window")]
    pub recent_window_secs: u64,

    /// Tenant bindings as `tenant=pid` pairs separated by commas
    #[serde(default)]
    pub processes: String,

    /// CPU quota applied to every bound tenant
    #[serde(default)]
    pub cpu_quota_percent: Option<f64>,

    /// Memory quota applied to every bound tenant
    #[serde(default)]
    pub memory_quota_mb: Option<f64>,

    #[serde(default = "default_leak_cpu_threshold")]
    pub leak_cpu_threshold: f64,

    #[serde(default = "default_leak_memory_threshold")]
    pub leak_memory_threshold_mb: f64,

    #[serde(default = "default_leak_thread_threshold")]
    pub leak_thread_threshold: f64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_sample_interval() -> u64 {
    1000
}

fn default_window_capacity() -> usize {
    1000
}

fn default_cpu_critical() -> f64 {
    95.0
}

fn default_sustained_samples() -> usize {
    3
}

fn default_dedup_window() -> u64 {
    300
}

fn default_stabilization() -> u64 {
    30
}

fn default_analysis_interval() -> u64 {
    10
}

fn default_recent_window() -> u64 {
    10
}

fn default_leak_cpu_threshold() -> f64 {
    20.0
}

fn default_leak_memory_threshold() -> f64 {
    50.0
}

fn default_leak_thread_threshold() -> f64 {
    10.0
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("AGENT").try_parsing(true))
            .build()?;

        config
            .try_deserialize()
            .context("invalid AGENT_* configuration")
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            sample_interval: Duration::from_millis(self.sample_interval_ms.max(1)),
            window_capacity: self.window_capacity,
            thresholds: StaticThresholds {
                cpu_critical_percent: self.cpu_critical_percent,
                memory_critical_mb: self.memory_critical_mb,
                thread_critical_count: None,
                sustained_samples: self.sustained_samples,
            },
            dedup_window: (self.dedup_window_secs > 0)
                .then(|| Duration::from_secs(self.dedup_window_secs)),
            node_name: self.node_name.clone(),
        }
    }

    pub fn leak_config(&self) -> LeakDetectorConfig {
        LeakDetectorConfig {
            recent_window: Duration::from_secs(self.recent_window_secs),
            ..Default::default()
        }
    }

    pub fn quota_config(&self) -> QuotaConfig {
        QuotaConfig {
            recent_window: Duration::from_secs(self.recent_window_secs),
            ..Default::default()
        }
    }

    /// Quota policies for the given tenants, if any quota is configured
    ///
    /// An unset quota is unbounded.
    pub fn quota_policies(&self, tenant_ids: &[String]) -> Vec<QuotaPolicy> {
        if self.cpu_quota_percent.is_none() && self.memory_quota_mb.is_none() {
            return Vec::new();
        }
        tenant_ids
            .iter()
            .map(|tenant_id| QuotaPolicy {
                tenant_id: tenant_id.clone(),
                cpu_quota_percent: self.cpu_quota_percent.unwrap_or(f64::INFINITY),
                memory_quota_mb: self.memory_quota_mb.unwrap_or(f64::INFINITY),
            })
            .collect()
    }

    pub fn process_bindings(&self) -> Result<Vec<(String, u32)>> {
        parse_processes(&self.processes)
    }
}

/// Parse `tenant-a=1234,tenant-b=5678`
pub fn parse_processes(raw: &str) -> Result<Vec<(String, u32)>> {
    let mut bindings = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((tenant, pid)) = entry.split_once('=') else {
            bail!("process binding '{}' is not of the form tenant=pid", entry);
        };
        let tenant = tenant.trim();
        if tenant.is_empty() {
            bail!("process binding '{}' has an empty tenant id", entry);
        }
        let pid: u32 = pid
            .trim()
            .parse()
            .with_context(|| format!("invalid pid in process binding '{}'", entry))?;
        bindings.push((tenant.to_string(), pid));
    }
    Ok(bindings)
}
