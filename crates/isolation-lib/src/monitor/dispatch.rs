//! Violation log and callback fan-out
//!
//! Every reported violation is appended to the log, then delivered to
//! each registered callback in registration order. A callback that
//! returns an error or panics is logged and skipped; the remaining
//! callbacks still receive the violation.

use crate::anomaly::Alerter;
use crate::health::{components, HealthRegistry};
use crate::models::Violation;
use crate::observability::{EngineMetrics, StructuredLogger};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Callback invoked for each delivered violation
pub type ViolationCallback = Arc<dyn Fn(&Violation) -> anyhow::Result<()> + Send + Sync>;

pub struct ViolationDispatcher {
    callbacks: RwLock<Vec<ViolationCallback>>,
    log: RwLock<Vec<Violation>>,
    /// Optional dedup in front of the callbacks; the log sees everything
    alerter: Option<Alerter>,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl ViolationDispatcher {
    pub fn new(
        alerter: Option<Alerter>,
        health: HealthRegistry,
        metrics: EngineMetrics,
        logger: StructuredLogger,
    ) -> Self {
        health.register(components::DISPATCHER);
        Self {
            callbacks: RwLock::new(Vec::new()),
            log: RwLock::new(Vec::new()),
            alerter,
            health,
            metrics,
            logger,
        }
    }

    pub fn register<F>(&self, callback: F)
    where
        F: Fn(&Violation) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut callbacks = self.callbacks.write().unwrap_or_else(|e| e.into_inner());
        callbacks.push(Arc::new(callback));
    }

    pub fn callback_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Append to the log and fan out
    ///
    /// Returns false if delivery was suppressed as a duplicate.
    pub fn dispatch(&self, violation: Violation) -> bool {
        self.log
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(violation.clone());
        self.metrics
            .inc_violation(&violation.violation_type.to_string());

        if let Some(alerter) = &self.alerter {
            if !alerter.admit(&violation) {
                debug!(
                    tenant_id = %violation.tenant_id,
                    violation_type = %violation.violation_type,
                    "Suppressed duplicate violation"
                );
                return false;
            }
        }

        self.logger.log_violation(&violation);

        // Snapshot the list so callbacks may register further callbacks
        let callbacks = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut failures = 0usize;
        for (index, callback) in callbacks.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| callback(&violation))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!(callback = index, error = %e, "Violation callback failed");
                }
                Err(_) => {
                    failures += 1;
                    warn!(callback = index, "Violation callback panicked");
                }
            }
        }

        if failures > 0 {
            self.metrics.inc_callback_failures();
            self.health.set_degraded(
                components::DISPATCHER,
                format!("{} callback(s) failed on last delivery", failures),
            );
        } else {
            self.health.set_healthy(components::DISPATCHER);
        }

        true
    }

    pub fn violations(&self) -> Vec<Violation> {
        self.log.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn violations_for(&self, tenant_id: &str) -> Vec<Violation> {
        self.log
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|v| v.tenant_id == tenant_id)
            .cloned()
            .collect()
    }
}
