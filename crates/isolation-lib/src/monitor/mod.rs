//! Continuous per-tenant resource sampling
//!
//! The monitor owns every tenant's process binding and rolling history.
//! A single background task samples all bindings on a fixed interval and
//! is the only writer of the history; analyzers and callers read copies
//! through the query methods.

mod dispatch;
mod registry;
mod thresholds;


pub use dispatch::{ViolationCallback, ViolationDispatcher};
pub use registry::ProcessRegistry;
pub use thresholds::StaticThresholds;

use crate::anomaly::Alerter;
use crate::collector::{MetricsWindow, ProcessHandle, DEFAULT_WINDOW_CAPACITY};
use crate::error::MonitorError;
use crate::health::{components, HealthRegistry};
use crate::models::{now_timestamp, ResourceSnapshot, TenantSummary, Violation};
use crate::observability::{EngineMetrics, StructuredLogger};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thresholds::ThresholdTracker;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the resource monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Interval between sampling passes (default: 1 second)
    pub sample_interval: Duration,
    /// Snapshots retained per tenant (default: 1000)
    pub window_capacity: usize,
    /// Built-in limits checked on every sample
    pub thresholds: StaticThresholds,
    /// Suppress repeated (tenant, type) deliveries within this window
    pub dedup_window: Option<Duration>,
    /// Name used in structured logs and alerts
    pub node_name: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(1),
            window_capacity: DEFAULT_WINDOW_CAPACITY,
            thresholds: StaticThresholds::default(),
            dedup_window: None,
            node_name: "local".to_string(),
        }
    }
}

/// Outcome of one sampling pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SampleReport {
    pub success_count: usize,
    pub error_count: usize,
    /// Samples dropped because the clock did not advance
    pub skipped_count: usize,
    /// First readings of rate-based providers, not stored
    pub warmup_count: usize,
    pub violations_fired: usize,
}

struct MonitorShared {
    config: MonitorConfig,
    registry: ProcessRegistry,
    windows: DashMap<String, MetricsWindow>,
    thresholds: ThresholdTracker,
    dispatcher: ViolationDispatcher,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

struct RunningLoop {
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

/// Background sampler and owner of all tenant histories
pub struct ResourceMonitor {
    shared: Arc<MonitorShared>,
    running: Mutex<Option<RunningLoop>>,
}

impl ResourceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self::with_health(config, HealthRegistry::new())
    }

    /// Create a monitor reporting into an existing health registry
    pub fn with_health(config: MonitorConfig, health: HealthRegistry) -> Self {
        let metrics = EngineMetrics::new();
        let logger = StructuredLogger::new(config.node_name.clone());
        let alerter = config
            .dedup_window
            .map(|window| Alerter::new(config.node_name.clone()).with_dedup_window(window));
        let dispatcher =
            ViolationDispatcher::new(alerter, health.clone(), metrics.clone(), logger.clone());
        health.register(components::SAMPLER);

        Self {
            shared: Arc::new(MonitorShared {
                thresholds: ThresholdTracker::new(config.thresholds.clone()),
                config,
                registry: ProcessRegistry::new(),
                windows: DashMap::new(),
                dispatcher,
                health,
                metrics,
                logger,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.shared.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.shared.health
    }

    /// Bind a tenant to a process; replaces any previous binding
    pub fn register_process(&self, tenant_id: &str, process: ProcessHandle) {
        self.shared.registry.register(tenant_id, process);
        self.shared
            .metrics
            .set_tenants_monitored(self.shared.registry.len() as i64);
    }

    /// Remove a tenant's binding; its history stays queryable
    pub fn unregister_process(&self, tenant_id: &str) -> bool {
        let removed = self.shared.registry.unregister(tenant_id).is_some();
        self.shared
            .metrics
            .set_tenants_monitored(self.shared.registry.len() as i64);
        removed
    }

    /// Remove a tenant's binding, history and threshold state
    pub fn clear_tenant(&self, tenant_id: &str) {
        self.unregister_process(tenant_id);
        self.shared.windows.remove(tenant_id);
        self.shared.thresholds.forget(tenant_id);
    }

    /// Tenants with a registered binding
    pub fn tenants(&self) -> Vec<String> {
        self.shared.registry.tenant_ids()
    }

    /// Start the background sampling loop
    ///
    /// Calling while already running is a no-op. Fails if there is no
    /// tokio runtime to host the loop.
    pub fn start(&self) -> Result<(), MonitorError> {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = running.as_ref() {
            if !existing.handle.is_finished() {
                debug!("Resource monitor already running");
                return Ok(());
            }
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = runtime.spawn(Self::run(self.shared.clone(), shutdown_rx));

        *running = Some(RunningLoop {
            shutdown_tx,
            handle,
        });
        self.shared.health.set_healthy(components::SAMPLER);
        self.shared
            .logger
            .log_startup(env!("CARGO_PKG_VERSION"), self.shared.registry.len());
        Ok(())
    }

    /// Stop the sampling loop and wait for it to exit
    ///
    /// A pass in progress completes first; once this returns no further
    /// snapshots are appended by the loop.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(running) = running else {
            return;
        };

        let _ = running.shutdown_tx.send(());
        if let Err(e) = running.handle.await {
            warn!(error = %e, "Sampling loop terminated abnormally");
        }
        self.shared.logger.log_shutdown("stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    async fn run(shared: Arc<MonitorShared>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = shared.config.sample_interval.as_millis() as u64,
            "Starting resource sampling loop"
        );

        let mut ticker = interval(shared.config.sample_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut passes = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!(passes = passes, "Shutting down resource sampling loop");
                    break;
                }
                _ = ticker.tick() => {
                    let report = shared.sample_once().await;
                    passes += 1;
                    debug!(
                        tenants = report.success_count,
                        errors = report.error_count,
                        violations = report.violations_fired,
                        "Sampling pass complete"
                    );
                }
            }
        }
    }

    /// Run one sampling pass over every binding
    ///
    /// The background loop calls this on each tick; it is public so a
    /// caller can drive sampling directly while the loop is stopped.
    pub async fn sample_once(&self) -> SampleReport {
        self.shared.sample_once().await
    }

    /// Aggregate stats over the trailing `window_seconds`
    ///
    /// Unknown tenants and empty windows yield a zero-valued summary.
    pub fn get_tenant_summary(&self, tenant_id: &str, window_seconds: f64) -> TenantSummary {
        let snapshots = self.snapshots(tenant_id, window_seconds);
        TenantSummary::from_snapshots(tenant_id, window_seconds, &snapshots)
    }

    /// Copy of the snapshots within the trailing `window_seconds`
    pub fn snapshots(&self, tenant_id: &str, window_seconds: f64) -> Vec<ResourceSnapshot> {
        self.snapshots_since(tenant_id, now_timestamp() - window_seconds)
    }

    /// Copy of the snapshots taken at or after `timestamp`
    pub fn snapshots_since(&self, tenant_id: &str, timestamp: f64) -> Vec<ResourceSnapshot> {
        self.shared
            .windows
            .get(tenant_id)
            .map(|w| w.since(timestamp))
            .unwrap_or_default()
    }

    /// Copy of the full retained history
    pub fn history(&self, tenant_id: &str) -> Vec<ResourceSnapshot> {
        self.shared
            .windows
            .get(tenant_id)
            .map(|w| w.to_vec())
            .unwrap_or_default()
    }

    pub fn latest(&self, tenant_id: &str) -> Option<ResourceSnapshot> {
        self.shared
            .windows
            .get(tenant_id)
            .and_then(|w| w.latest().cloned())
    }

    pub fn window_len(&self, tenant_id: &str) -> usize {
        self.shared
            .windows
            .get(tenant_id)
            .map(|w| w.len())
            .unwrap_or(0)
    }

    /// Register a callback for every delivered violation
    pub fn register_violation_callback<F>(&self, callback: F)
    where
        F: Fn(&Violation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.shared.dispatcher.register(callback);
    }

    /// Record a violation and deliver it to callbacks
    pub fn report_violation(&self, violation: Violation) -> bool {
        self.shared.dispatcher.dispatch(violation)
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.shared.dispatcher.violations()
    }

    pub fn violations_for(&self, tenant_id: &str) -> Vec<Violation> {
        self.shared.dispatcher.violations_for(tenant_id)
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(running) = running {
            let _ = running.shutdown_tx.send(());
        }
    }
}

impl MonitorShared {
    async fn sample_once(&self) -> SampleReport {
        let start = Instant::now();
        let mut report = SampleReport::default();

        for (tenant_id, process) in self.registry.list() {
            let stats = match process.sample().await {
                Ok(stats) => stats,
                Err(e) if e.is_warming_up() => {
                    report.warmup_count += 1;
                    debug!(
                        tenant_id = %tenant_id,
                        process = %process.describe(),
                        "Counter warm-up, no snapshot"
                    );
                    continue;
                }
                Err(e) => {
                    report.error_count += 1;
                    self.metrics.inc_sampling_errors();
                    self.logger
                        .log_sampling_failure(&tenant_id, &process.describe(), &e.to_string());
                    continue;
                }
            };

            let snapshot = ResourceSnapshot {
                timestamp: now_timestamp(),
                tenant_id: tenant_id.clone(),
                cpu_percent: stats.cpu_percent,
                memory_mb: stats.memory_mb,
                thread_count: stats.thread_count,
                fd_count: stats.fd_count,
            };

            let appended = self
                .windows
                .entry(tenant_id.clone())
                .or_insert_with(|| MetricsWindow::new(self.config.window_capacity))
                .push(snapshot.clone());
            if !appended {
                report.skipped_count += 1;
                debug!(tenant_id = %tenant_id, "Clock did not advance, sample dropped");
                continue;
            }

            report.success_count += 1;
            self.metrics.inc_samples_collected();

            for violation in self.thresholds.observe(&snapshot) {
                report.violations_fired += 1;
                self.dispatcher.dispatch(violation);
            }
        }

        self.metrics
            .observe_sampling_latency(start.elapsed().as_secs_f64());
        if report.error_count > 0 {
            self.health.set_degraded(
                components::SAMPLER,
                format!("{} tenant(s) failed to sample", report.error_count),
            );
        } else {
            self.health.set_healthy(components::SAMPLER);
        }

        report
    }
}

/// Builder for the resource monitor
pub struct ResourceMonitorBuilder {
    config: MonitorConfig,
    health: Option<HealthRegistry>,
}

impl ResourceMonitorBuilder {
    pub fn new() -> Self {
        Self {
            config: MonitorConfig::default(),
            health: None,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.sample_interval = interval;
        self
    }

    pub fn window_capacity(mut self, capacity: usize) -> Self {
        self.config.window_capacity = capacity;
        self
    }

    pub fn thresholds(mut self, thresholds: StaticThresholds) -> Self {
        self.config.thresholds = thresholds;
        self
    }

    pub fn dedup_window(mut self, window: Duration) -> Self {
        self.config.dedup_window = Some(window);
        self
    }

    pub fn node_name(mut self, name: impl Into<String>) -> Self {
        self.config.node_name = name.into();
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> ResourceMonitor {
        match self.health {
            Some(health) => ResourceMonitor::with_health(self.config, health),
            None => ResourceMonitor::new(self.config),
        }
    }
}

impl Default for ResourceMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
