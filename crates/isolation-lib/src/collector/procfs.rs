//! procfs process sampling
//!
//! Reads resource usage for a single process:
//! - /proc/<pid>/stat for cumulative CPU ticks
//! - /proc/<pid>/status for resident memory and thread count
//! - /proc/<pid>/fd for the open descriptor count

use super::{async_trait, ProcessStats, ProcessStatsProvider};
use crate::error::StatsError;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tokio::fs;
use tracing::debug;

/// Clock ticks per second used by /proc accounting on Linux
pub const USER_HZ: f64 = 100.0;

/// Samples a real OS process from procfs
pub struct ProcfsProvider {
    pid: u32,
    proc_path: PathBuf,
    /// Previous (cpu ticks, wall instant) used for the CPU delta
    last_cpu: Mutex<Option<(u64, Instant)>>,
}

impl ProcfsProvider {
    pub fn new(pid: u32) -> Self {
        Self::with_proc_path(pid, "/proc")
    }

    /// Create provider with custom proc path (for testing)
    pub fn with_proc_path(pid: u32, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            pid,
            proc_path: proc_path.into(),
            last_cpu: Mutex::new(None),
        }
    }

    /// Provider for the current process
    pub fn current() -> Self {
        Self::new(std::process::id())
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    async fn read_file(&self, name: &str) -> Result<String, StatsError> {
        let path = self.proc_path.join(self.pid.to_string()).join(name);
        fs::read_to_string(&path)
            .await
            .map_err(|e| StatsError::from_io(&self.describe(), &path.display().to_string(), e))
    }

    async fn count_fds(&self) -> Result<u32, StatsError> {
        let path = self.proc_path.join(self.pid.to_string()).join("fd");
        let mut entries = match fs::read_dir(&path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                // Descriptor tables of other users' processes are not listable
                debug!(pid = self.pid, "fd table not readable, reporting zero");
                return Ok(0);
            }
            Err(e) => {
                return Err(StatsError::from_io(
                    &self.describe(),
                    &path.display().to_string(),
                    e,
                ))
            }
        };

        let mut count = 0u32;
        while let Ok(Some(_)) = entries.next_entry().await {
            count += 1;
        }
        Ok(count)
    }

    /// Convert a cumulative tick reading into a percentage since the last call
    ///
    /// The first call only records the tick count and returns None.
    fn cpu_percent(&self, total_ticks: u64, now: Instant) -> Option<f64> {
        let mut last = self.last_cpu.lock().unwrap_or_else(|e| e.into_inner());
        let percent = last.map(|(prev_ticks, prev_at)| {
            let elapsed = now.duration_since(prev_at).as_secs_f64();
            if elapsed <= 0.0 {
                0.0
            } else {
                let delta = total_ticks.saturating_sub(prev_ticks) as f64 / USER_HZ;
                delta / elapsed * 100.0
            }
        });
        *last = Some((total_ticks, now));
        percent
    }
}

/// Parse /proc/<pid>/stat contents
/// Returns (utime + stime ticks, num_threads)
pub fn parse_stat(content: &str) -> Option<(u64, u32)> {
    // comm may contain spaces and parentheses; fields resume after the last ')'
    let rest = &content[content.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    if fields.len() < 18 {
        return None;
    }

    let utime: u64 = fields[11].parse().ok()?;
    let stime: u64 = fields[12].parse().ok()?;
    let num_threads: u32 = fields[17].parse().ok()?;
    Some((utime + stime, num_threads))
}

/// Parse /proc/<pid>/status contents
/// Returns (resident memory in MB, thread count)
pub fn parse_status(content: &str) -> (f64, Option<u32>) {
    let mut rss_kb = 0u64;
    let mut threads = None;

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() >= 2 {
            match parts[0] {
                "VmRSS:" => rss_kb = parts[1].parse().unwrap_or(0),
                "Threads:" => threads = parts[1].parse().ok(),
                _ => {}
            }
        }
    }

    (rss_kb as f64 / 1024.0, threads)
}

#[async_trait]
impl ProcessStatsProvider for ProcfsProvider {
    async fn sample(&self) -> Result<ProcessStats, StatsError> {
        let stat = self.read_file("stat").await?;
        let now = Instant::now();
        let (ticks, stat_threads) = parse_stat(&stat).ok_or_else(|| StatsError::Parse {
            process: self.describe(),
            field: "stat".to_string(),
        })?;

        let Some(cpu_percent) = self.cpu_percent(ticks, now) else {
            return Err(StatsError::WarmingUp {
                process: self.describe(),
            });
        };

        let status = self.read_file("status").await?;
        let (memory_mb, status_threads) = parse_status(&status);
        let fd_count = self.count_fds().await?;

        Ok(ProcessStats {
            cpu_percent,
            memory_mb,
            thread_count: status_threads.unwrap_or(stat_threads),
            fd_count,
        })
    }

    fn describe(&self) -> String {
        format!("pid {}", self.pid)
    }
}
