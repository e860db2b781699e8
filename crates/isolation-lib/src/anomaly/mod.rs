//! Analyzers over the monitor's tenant histories
//!
//! This module provides:
//! - Leak detection (sustained growth relative to a baseline)
//! - Cross-tenant performance isolation checks
//! - Quota enforcement against recent averages
//! - Alert deduplication and Alertmanager formatting

mod alerter;
mod isolation;
mod leak_detector;
mod quota;

pub use alerter::{Alerter, AlertmanagerAlert, AlertmanagerPayload};
pub use isolation::{IsolationConfig, PerformanceIsolationValidator};
pub use leak_detector::{LeakCheck, LeakCheckStatus, LeakDetectorConfig, ResourceLeakDetector};
pub use quota::{QuotaConfig, QuotaEnforcer, QuotaEvaluation};
