//! End-to-end scenarios with a running monitor and synthetic tenants

use isolation_lib::anomaly::{IsolationConfig, LeakCheckStatus, LeakDetectorConfig, QuotaConfig};
use isolation_lib::manager::{LoadProfile, TenantProcess, TenantSpec};
use isolation_lib::{
    PerformanceIsolationValidator, ProcessStats, QuotaEnforcer, QuotaPolicy, ResourceLeakDetector,
    ResourceMonitor, ResourceMonitorBuilder, Severity, SyntheticProcess, TenantAgentManager,
    Violation, ViolationType,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SAMPLE_INTERVAL: Duration = Duration::from_millis(20);
const RECENT_WINDOW: Duration = Duration::from_millis(200);

fn running_monitor() -> Arc<ResourceMonitor> {
    let monitor = Arc::new(ResourceMonitorBuilder::new().interval(SAMPLE_INTERVAL).build());
    monitor.start().unwrap();
    monitor
}

fn synthetic(name: &str, cpu: f64, memory_mb: f64) -> Arc<SyntheticProcess> {
    Arc::new(SyntheticProcess::with_base(
        name,
        ProcessStats {
            cpu_percent: cpu,
            memory_mb,
            thread_count: 4,
            fd_count: 16,
        },
    ))
}

/// Create a tenant backed by a synthetic process with one running agent
fn add_tenant(manager: &TenantAgentManager, id: &str, cpu: f64, memory_mb: f64) -> Arc<SyntheticProcess> {
    let process = synthetic(id, cpu, memory_mb);
    manager
        .create_tenant(TenantSpec::new(id).process(TenantProcess::Synthetic(process.clone())))
        .unwrap();
    manager.create_agent(id, "agent-0").unwrap();
    manager.start_agent(id, "agent-0").unwrap();
    process
}

#[tokio::test]
async fn noisy_neighbour_alone_does_not_flag_quiet_tenants() {
    let monitor = running_monitor();
    let manager = TenantAgentManager::new(monitor.clone());
    add_tenant(&manager, "A", 5.0, 100.0);
    let b = add_tenant(&manager, "B", 5.0, 100.0);
    add_tenant(&manager, "C", 5.0, 100.0);

    let validator = PerformanceIsolationValidator::with_config(
        monitor.clone(),
        IsolationConfig {
            recent_window: RECENT_WINDOW,
            ..Default::default()
        },
    );
    let baselines = validator
        .establish_performance_baseline(&["A", "B", "C"], Duration::from_millis(200))
        .await;
    assert_eq!(baselines.len(), 3);
    assert!((baselines["B"].baseline_cpu - 5.0).abs() < 1e-9);

    // A goes to 60% CPU; B and C are untouched
    manager
        .generate_load(
            "A",
            "agent-0",
            LoadProfile::Constant {
                cpu_percent: 55.0,
                memory_mb: 0.0,
            },
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(monitor.get_tenant_summary("A", 0.1).avg_cpu_percent > 50.0);

    let violations = validator.detect_cross_tenant_impact("A", &["B", "C"], 10.0);
    assert!(violations.is_empty());

    // B's own CPU rises 20% over its baseline
    b.set_cpu(6.0);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let violations = validator.detect_cross_tenant_impact("A", &["B", "C"], 10.0);
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].tenant_id, "B");
    assert_eq!(violations[0].violation_type, ViolationType::CrossTenantPerformance);
    assert_eq!(violations[0].severity, Severity::Medium);
    assert_eq!(violations[0].details["source_tenant"], "A");

    manager.cleanup_all().await;
    monitor.stop().await;
}

#[tokio::test]
async fn linear_memory_growth_is_detected_as_leak() {
    let monitor = running_monitor();
    let manager = TenantAgentManager::new(monitor.clone());
    add_tenant(&manager, "leaky", 5.0, 100.0);

    let detector = ResourceLeakDetector::with_config(
        monitor.clone(),
        LeakDetectorConfig {
            recent_window: Duration::from_millis(150),
            ..Default::default()
        },
    );
    let baseline = detector
        .establish_baseline("leaky", Duration::from_millis(200))
        .await
        .unwrap();
    assert!((baseline.baseline_memory_mb - 100.0).abs() < 1e-9);

    // 100MB -> 160MB
    manager
        .generate_load(
            "leaky",
            "agent-0",
            LoadProfile::LinearMemoryGrowth {
                cpu_percent: 0.0,
                start_mb: 0.0,
                end_mb: 60.0,
                ramp: Duration::from_millis(400),
            },
        )
        .unwrap();
    tokio::time::sleep(Duration::from_millis(800)).await;

    let check = detector.check_for_leak("leaky", 30.0, 20.0);
    assert_eq!(check.status, LeakCheckStatus::Evaluated);
    assert!(check.leak_detected);
    assert!(check.exceeds_absolute);
    assert!(check.exceeds_percent);
    assert!((check.current_memory_mb - 160.0).abs() < 1e-6);

    let leaks = monitor.violations_for("leaky");
    assert_eq!(leaks.len(), 1);
    assert_eq!(leaks[0].violation_type, ViolationType::Memory);
    assert_eq!(leaks[0].severity, Severity::Critical);

    manager.cleanup_all().await;
    monitor.stop().await;
}

#[tokio::test]
async fn no_appends_after_stop_returns() {
    let monitor = Arc::new(
        ResourceMonitorBuilder::new()
            .interval(Duration::from_millis(10))
            .build(),
    );
    monitor.register_process("t1", synthetic("t1", 1.0, 10.0));
    monitor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    monitor.stop().await;
    let len_after_stop = monitor.window_len("t1");
    assert!(len_after_stop > 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(monitor.window_len("t1"), len_after_stop);
}

#[tokio::test]
async fn analyzer_violations_reach_callbacks_in_order() {
    let monitor = Arc::new(
        ResourceMonitorBuilder::new()
            .interval(SAMPLE_INTERVAL)
            .dedup_window(Duration::from_secs(60))
            .build(),
    );
    let received: Arc<Mutex<Vec<Violation>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    monitor.register_violation_callback(|_| anyhow::bail!("pager offline"));
    monitor.register_violation_callback(move |v| {
        sink.lock().unwrap().push(v.clone());
        Ok(())
    });

    monitor.register_process("busy", synthetic("busy", 70.0, 300.0));
    monitor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    let enforcer = QuotaEnforcer::with_config(
        monitor.clone(),
        QuotaConfig {
            recent_window: RECENT_WINDOW,
            ..Default::default()
        },
    );
    assert!(!enforcer.enforce_cpu_quota("busy", 50.0));
    assert!(enforcer.enforce_memory_quota("busy", 512.0));
    assert!(monitor.violations().is_empty());

    enforcer.set_policy(QuotaPolicy {
        tenant_id: "busy".to_string(),
        cpu_quota_percent: 50.0,
        memory_quota_mb: 256.0,
    });
    let evaluations = enforcer.enforce_all();
    assert!(!evaluations[0].within_quota());

    // Second pass is logged but deduplicated before delivery
    enforcer.enforce_all();
    monitor.stop().await;

    let received = received.lock().unwrap();
    let types: Vec<ViolationType> = received.iter().map(|v| v.violation_type).collect();
    assert_eq!(types, vec![ViolationType::Cpu, ViolationType::Memory]);
    assert_eq!(monitor.violations_for("busy").len(), 4);
}
