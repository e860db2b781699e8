//! Per-process resource sampling
//!
//! This module provides the sources the monitor samples from. Real
//! processes are read from the procfs filesystem; synthetic processes
//! carry settable readings and are driven by tests and load generators.

mod procfs;
mod synthetic;
mod window;


pub use procfs::{parse_stat, parse_status, ProcfsProvider, USER_HZ};
pub use synthetic::SyntheticProcess;
pub use window::{MetricsWindow, DEFAULT_WINDOW_CAPACITY};

use crate::error::StatsError;
use std::sync::Arc;

pub use async_trait::async_trait;

/// One raw reading from a process
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessStats {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub thread_count: u32,
    pub fd_count: u32,
}

/// Trait for anything the monitor can sample on behalf of a tenant
#[async_trait]
pub trait ProcessStatsProvider: Send + Sync {
    /// Read current CPU, memory, thread and descriptor usage
    async fn sample(&self) -> Result<ProcessStats, StatsError>;

    /// Short label for logs (e.g. "pid 1234")
    fn describe(&self) -> String;
}

/// Shared handle bound to a tenant in the monitor
pub type ProcessHandle = Arc<dyn ProcessStatsProvider>;
