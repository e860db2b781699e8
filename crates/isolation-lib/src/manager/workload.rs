//! Synthetic load shapes driven onto a tenant's synthetic process
//!
//! Each generator owns one contribution slot (keyed by agent id) on the
//! process and rewrites it on a fixed step until aborted.

use crate::collector::{ProcessStats, SyntheticProcess};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

/// How often a generator updates its contribution
pub const LOAD_STEP: Duration = Duration::from_millis(50);

/// Shape of the load an agent puts on its tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadProfile {
    /// Flat CPU and memory
    Constant { cpu_percent: f64, memory_mb: f64 },
    /// Memory ramps linearly from `start_mb` to `end_mb` over `ramp`, then holds
    LinearMemoryGrowth {
        cpu_percent: f64,
        start_mb: f64,
        end_mb: f64,
        ramp: Duration,
    },
    /// CPU alternates between idle and burst; bursts take `duty_cycle` of each period
    Burst {
        idle_cpu_percent: f64,
        burst_cpu_percent: f64,
        memory_mb: f64,
        period: Duration,
        duty_cycle: f64,
    },
}

impl LoadProfile {
    /// Contribution at `elapsed` since the generator started
    pub fn at(&self, elapsed: Duration) -> ProcessStats {
        match self {
            LoadProfile::Constant {
                cpu_percent,
                memory_mb,
            } => contribution(*cpu_percent, *memory_mb),
            LoadProfile::LinearMemoryGrowth {
                cpu_percent,
                start_mb,
                end_mb,
                ramp,
            } => {
                let progress = if ramp.is_zero() {
                    1.0
                } else {
                    (elapsed.as_secs_f64() / ramp.as_secs_f64()).min(1.0)
                };
                contribution(*cpu_percent, start_mb + (end_mb - start_mb) * progress)
            }
            LoadProfile::Burst {
                idle_cpu_percent,
                burst_cpu_percent,
                memory_mb,
                period,
                duty_cycle,
            } => {
                let phase = if period.is_zero() {
                    0.0
                } else {
                    (elapsed.as_secs_f64() % period.as_secs_f64()) / period.as_secs_f64()
                };
                let cpu = if phase < duty_cycle.clamp(0.0, 1.0) {
                    *burst_cpu_percent
                } else {
                    *idle_cpu_percent
                };
                contribution(cpu, *memory_mb)
            }
        }
    }
}

fn contribution(cpu_percent: f64, memory_mb: f64) -> ProcessStats {
    ProcessStats {
        cpu_percent,
        memory_mb,
        thread_count: 0,
        fd_count: 0,
    }
}

/// Drive `profile` onto `process` under `source` until the task is aborted
pub(crate) async fn run_generator(
    process: Arc<SyntheticProcess>,
    source: String,
    profile: LoadProfile,
) {
    debug!(source = %source, profile = ?profile, "Load generator started");
    let started = Instant::now();
    let mut ticker = interval(LOAD_STEP);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        process.set_contribution(&source, profile.at(started.elapsed()));
    }
}
