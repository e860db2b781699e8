//! Multi-tenant resource isolation engine
//!
//! This crate provides the core functionality for:
//! - Per-tenant process sampling with bounded rolling history
//! - Leak detection against established baselines
//! - Cross-tenant performance isolation checks
//! - Quota enforcement
//! - Tenant and agent lifecycle orchestration
//! - Health checks and observability

pub mod anomaly;
pub mod collector;
pub mod error;
pub mod health;
pub mod manager;
pub mod models;
pub mod monitor;
pub mod observability;

pub use anomaly::{PerformanceIsolationValidator, QuotaEnforcer, ResourceLeakDetector};
pub use collector::{
    ProcessHandle, ProcessStats, ProcessStatsProvider, ProcfsProvider, SyntheticProcess,
};
pub use error::{MonitorError, StatsError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use manager::{ManagerError, TenantAgentManager};
pub use models::*;
pub use monitor::{MonitorConfig, ResourceMonitor, ResourceMonitorBuilder};
pub use observability::{EngineMetrics, StructuredLogger};
