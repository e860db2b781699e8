//! Isolation agent - per-node tenant resource isolation monitor
//!
//! Samples the configured tenant processes, establishes leak baselines
//! after a stabilization period and then runs leak and quota analysis
//! on a fixed interval until interrupted.

use anyhow::Result;
use isolation_lib::{
    anomaly::Alerter, health::HealthRegistry, observability::StructuredLogger, ProcfsProvider,
    QuotaEnforcer, ResourceLeakDetector, ResourceMonitor,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting isolation-agent");

    let config = config::AgentConfig::load()?;
    info!(node_name = %config.node_name, "Agent configured");

    let health = HealthRegistry::new();
    let logger = StructuredLogger::new(config.node_name.clone());
    let monitor = Arc::new(ResourceMonitor::with_health(
        config.monitor_config(),
        health.clone(),
    ));

    let mut bindings = config.process_bindings()?;
    if bindings.is_empty() {
        bindings.push(("self".to_string(), std::process::id()));
    }
    for (tenant_id, pid) in &bindings {
        info!(tenant_id = %tenant_id, pid = pid, "Binding tenant process");
        monitor.register_process(tenant_id, Arc::new(ProcfsProvider::new(*pid)));
    }
    let tenant_ids: Vec<String> = bindings.into_iter().map(|(tenant_id, _)| tenant_id).collect();

    // Forward violations in Alertmanager form for the control plane to pick up
    let alerter = Alerter::new(config.node_name.clone());
    monitor.register_violation_callback(move |violation| {
        let payload = Alerter::create_alertmanager_payload(vec![
            alerter.to_alertmanager_alert(violation)
        ]);
        info!(alert = %serde_json::to_string(&payload)?, "Violation alert");
        Ok(())
    });

    monitor.start()?;
    health.set_ready(true);

    let detector = ResourceLeakDetector::with_config(monitor.clone(), config.leak_config());
    let enforcer = QuotaEnforcer::with_config(monitor.clone(), config.quota_config());
    for policy in config.quota_policies(&tenant_ids) {
        enforcer.set_policy(policy);
    }

    let analysis = async {
        tokio::time::sleep(Duration::from_secs(config.stabilization_secs)).await;
        // Retained history now covers the stabilization period
        for tenant_id in &tenant_ids {
            if detector
                .establish_baseline(tenant_id, Duration::ZERO)
                .await
                .is_none()
            {
                warn!(tenant_id = %tenant_id, "No baseline established");
            }
        }

        let mut ticker =
            tokio::time::interval(Duration::from_secs(config.analysis_interval_secs.max(1)));
        loop {
            ticker.tick().await;
            let leaking = detector.detect_all_leaks(
                config.leak_cpu_threshold,
                config.leak_memory_threshold_mb,
                config.leak_thread_threshold,
            );
            let over_quota = enforcer
                .enforce_all()
                .iter()
                .filter(|e| !e.within_quota())
                .count();
            debug!(
                leaking = leaking.len(),
                over_quota = over_quota,
                "Analysis pass complete"
            );
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        _ = analysis => {}
    }

    health.set_ready(false);
    monitor.stop().await;
    info!("Shutting down");

    Ok(())
}
