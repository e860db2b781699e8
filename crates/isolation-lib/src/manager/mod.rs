//! Tenant and agent lifecycle orchestration
//!
//! The manager owns the tenant table and each tenant's agents. Starting
//! an agent binds the tenant's process to the monitor; agents can drive
//! synthetic load onto that process and report their own resource usage,
//! which is checked against the tenant's static limits.

mod agent;
mod error;
mod workload;


pub use agent::{AgentInfo, AgentResources, AgentState};
pub use error::ManagerError;
pub use workload::{LoadProfile, LOAD_STEP};

use crate::collector::{ProcessHandle, ProcfsProvider, SyntheticProcess};
use crate::models::{now_timestamp, Severity, SeverityTiers, Violation, ViolationType};
use crate::monitor::ResourceMonitor;
use agent::AgentInstance;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, ManagerError>;

pub const DEFAULT_MAX_AGENTS: usize = 10;

/// Tenant-level ceilings checked on every resource update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub max_memory_mb: f64,
    pub max_cpu_percent: f64,
    pub max_requests: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: 1024.0,
            max_cpu_percent: 80.0,
            max_requests: 10_000,
        }
    }
}

/// Process a tenant's agents run in
#[derive(Debug, Clone, Default)]
pub enum TenantProcess {
    /// Nothing to monitor
    #[default]
    None,
    /// An OS process read through procfs
    Os(u32),
    /// An in-memory process agents can drive load onto
    Synthetic(Arc<SyntheticProcess>),
}

#[derive(Debug, Clone)]
pub struct TenantSpec {
    pub tenant_id: String,
    pub name: String,
    pub max_agents: usize,
    pub resource_limits: ResourceLimits,
    pub process: TenantProcess,
}

impl TenantSpec {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        let tenant_id = tenant_id.into();
        Self {
            name: tenant_id.clone(),
            tenant_id,
            max_agents: DEFAULT_MAX_AGENTS,
            resource_limits: ResourceLimits::default(),
            process: TenantProcess::None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn max_agents(mut self, max: usize) -> Self {
        self.max_agents = max;
        self
    }

    pub fn resource_limits(mut self, limits: ResourceLimits) -> Self {
        self.resource_limits = limits;
        self
    }

    pub fn process(mut self, process: TenantProcess) -> Self {
        self.process = process;
        self
    }
}

/// Point-in-time view of a tenant
#[derive(Debug, Clone, Serialize)]
pub struct TenantStats {
    pub tenant_id: String,
    pub name: String,
    pub agent_count: usize,
    pub running_agents: usize,
    pub usage: AgentResources,
    pub limits: ResourceLimits,
    pub over_request_limit: bool,
    pub violation_count: usize,
}

struct TenantEntry {
    spec: TenantSpec,
    handle: Option<ProcessHandle>,
    agents: BTreeMap<String, AgentInstance>,
}

impl TenantEntry {
    fn synthetic(&self) -> Option<Arc<SyntheticProcess>> {
        match &self.spec.process {
            TenantProcess::Synthetic(process) => Some(process.clone()),
            _ => None,
        }
    }

    fn usage(&self) -> AgentResources {
        AgentResources::sum(self.agents.values().map(|a| &a.resources))
    }

    fn agent_mut(&mut self, agent_id: &str) -> Result<&mut AgentInstance> {
        let tenant_id = &self.spec.tenant_id;
        self.agents
            .get_mut(agent_id)
            .ok_or_else(|| ManagerError::AgentNotFound {
                tenant_id: tenant_id.clone(),
                agent_id: agent_id.to_string(),
            })
    }
}

/// Lifecycle manager for tenants and their agents
pub struct TenantAgentManager {
    monitor: Arc<ResourceMonitor>,
    tenants: Mutex<HashMap<String, TenantEntry>>,
    violations: Mutex<Vec<Violation>>,
    tiers: SeverityTiers,
}

impl TenantAgentManager {
    pub fn new(monitor: Arc<ResourceMonitor>) -> Self {
        Self::with_tiers(monitor, SeverityTiers::default())
    }

    pub fn with_tiers(monitor: Arc<ResourceMonitor>, tiers: SeverityTiers) -> Self {
        Self {
            monitor,
            tenants: Mutex::new(HashMap::new()),
            violations: Mutex::new(Vec::new()),
            tiers,
        }
    }

    pub fn monitor(&self) -> &Arc<ResourceMonitor> {
        &self.monitor
    }

    fn tenants(&self) -> MutexGuard<'_, HashMap<String, TenantEntry>> {
        self.tenants.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tenant_mut<'a>(
        tenants: &'a mut HashMap<String, TenantEntry>,
        tenant_id: &str,
    ) -> Result<&'a mut TenantEntry> {
        tenants
            .get_mut(tenant_id)
            .ok_or_else(|| ManagerError::TenantNotFound {
                tenant_id: tenant_id.to_string(),
            })
    }

    pub fn create_tenant(&self, spec: TenantSpec) -> Result<()> {
        let mut tenants = self.tenants();
        if tenants.contains_key(&spec.tenant_id) {
            return Err(ManagerError::TenantExists {
                tenant_id: spec.tenant_id,
            });
        }

        let handle: Option<ProcessHandle> = match &spec.process {
            TenantProcess::None => None,
            TenantProcess::Os(pid) => Some(Arc::new(ProcfsProvider::new(*pid))),
            TenantProcess::Synthetic(process) => Some(process.clone()),
        };

        info!(
            tenant_id = %spec.tenant_id,
            name = %spec.name,
            max_agents = spec.max_agents,
            "Tenant created"
        );
        tenants.insert(
            spec.tenant_id.clone(),
            TenantEntry {
                spec,
                handle,
                agents: BTreeMap::new(),
            },
        );
        Ok(())
    }

    pub fn create_agent(&self, tenant_id: &str, agent_id: &str) -> Result<()> {
        let mut tenants = self.tenants();
        let tenant = Self::tenant_mut(&mut tenants, tenant_id)?;

        if tenant.agents.contains_key(agent_id) {
            return Err(ManagerError::AgentExists {
                tenant_id: tenant_id.to_string(),
                agent_id: agent_id.to_string(),
            });
        }
        if tenant.agents.len() >= tenant.spec.max_agents {
            return Err(ManagerError::AgentLimitReached {
                tenant_id: tenant_id.to_string(),
                max_agents: tenant.spec.max_agents,
            });
        }

        tenant.agents.insert(
            agent_id.to_string(),
            AgentInstance::new(tenant_id, agent_id, now_timestamp()),
        );
        debug!(tenant_id = %tenant_id, agent_id = %agent_id, "Agent created");
        Ok(())
    }

    /// Move an agent to running and bind the tenant's process to the monitor
    pub fn start_agent(&self, tenant_id: &str, agent_id: &str) -> Result<()> {
        let handle = {
            let mut tenants = self.tenants();
            let tenant = Self::tenant_mut(&mut tenants, tenant_id)?;
            let handle = tenant.handle.clone();
            let agent = tenant.agent_mut(agent_id)?;
            if !agent.state.can_start() {
                return Err(ManagerError::InvalidTransition {
                    agent_id: agent_id.to_string(),
                    state: agent.state,
                    action: "start",
                });
            }
            agent.state = AgentState::Running;
            agent.started_at = Some(now_timestamp());
            handle
        };

        if let Some(handle) = handle {
            self.monitor.register_process(tenant_id, handle);
        }
        info!(tenant_id = %tenant_id, agent_id = %agent_id, "Agent started");
        Ok(())
    }

    /// Move an agent to stopped, ending any load it was generating
    ///
    /// Returns once the load generator has exited and its contribution
    /// has been withdrawn.
    pub async fn stop_agent(&self, tenant_id: &str, agent_id: &str) -> Result<()> {
        let (load, synthetic) = {
            let mut tenants = self.tenants();
            let tenant = Self::tenant_mut(&mut tenants, tenant_id)?;
            let synthetic = tenant.synthetic();
            let agent = tenant.agent_mut(agent_id)?;
            if !agent.state.can_stop() {
                return Err(ManagerError::InvalidTransition {
                    agent_id: agent_id.to_string(),
                    state: agent.state,
                    action: "stop",
                });
            }
            agent.state = AgentState::Stopped;
            (agent.load.take(), synthetic)
        };

        retire_load(load, synthetic.as_deref(), agent_id).await;
        info!(tenant_id = %tenant_id, agent_id = %agent_id, "Agent stopped");
        Ok(())
    }

    /// Record an agent's resource usage and check tenant limits
    ///
    /// Returns the violations raised by this update. They are also kept
    /// in the manager's list and reported through the monitor.
    pub fn update_agent_resources(
        &self,
        tenant_id: &str,
        agent_id: &str,
        resources: AgentResources,
    ) -> Result<Vec<Violation>> {
        let (usage, limits) = {
            let mut tenants = self.tenants();
            let tenant = Self::tenant_mut(&mut tenants, tenant_id)?;
            tenant.agent_mut(agent_id)?.resources = resources;
            (tenant.usage(), tenant.spec.resource_limits)
        };

        let mut fired = Vec::new();
        if usage.memory_mb > limits.max_memory_mb {
            fired.push(self.limit_violation(
                tenant_id,
                agent_id,
                ViolationType::Memory,
                usage.memory_mb,
                limits.max_memory_mb,
            ));
        }
        if usage.cpu_usage > limits.max_cpu_percent {
            fired.push(self.limit_violation(
                tenant_id,
                agent_id,
                ViolationType::Cpu,
                usage.cpu_usage,
                limits.max_cpu_percent,
            ));
        }
        if usage.requests_count > limits.max_requests {
            warn!(
                tenant_id = %tenant_id,
                requests = usage.requests_count,
                limit = limits.max_requests,
                "Tenant request count over limit"
            );
        }

        if !fired.is_empty() {
            self.violations
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .extend(fired.iter().cloned());
            for violation in &fired {
                self.monitor.report_violation(violation.clone());
            }
        }
        Ok(fired)
    }

    fn limit_violation(
        &self,
        tenant_id: &str,
        agent_id: &str,
        violation_type: ViolationType,
        measured: f64,
        limit: f64,
    ) -> Violation {
        let severity = if limit > 0.0 {
            self.tiers.classify((measured - limit) / limit * 100.0)
        } else {
            Severity::Critical
        };
        Violation::new(tenant_id, violation_type, measured, limit, severity)
            .with_detail("source", "tenant_limits")
            .with_detail("agent_id", agent_id)
    }

    /// Drive `profile` onto the tenant's synthetic process on behalf of an agent
    ///
    /// Replaces any generator the agent already had.
    pub fn generate_load(&self, tenant_id: &str, agent_id: &str, profile: LoadProfile) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ManagerError::NoRuntime)?;

        let mut tenants = self.tenants();
        let tenant = Self::tenant_mut(&mut tenants, tenant_id)?;
        let synthetic = tenant.synthetic();
        let agent = tenant.agent_mut(agent_id)?;
        if !agent.state.is_running() {
            return Err(ManagerError::InvalidTransition {
                agent_id: agent_id.to_string(),
                state: agent.state,
                action: "generate load for",
            });
        }
        let Some(synthetic) = synthetic else {
            return Err(ManagerError::NoSyntheticProcess {
                tenant_id: tenant_id.to_string(),
            });
        };

        agent.abort_load();
        agent.load = Some(runtime.spawn(workload::run_generator(
            synthetic,
            agent_id.to_string(),
            profile,
        )));
        debug!(tenant_id = %tenant_id, agent_id = %agent_id, "Load generation started");
        Ok(())
    }

    /// Remove a tenant, its agents and its monitor binding and history
    pub async fn cleanup_tenant(&self, tenant_id: &str) -> Result<()> {
        let entry = self
            .tenants()
            .remove(tenant_id)
            .ok_or_else(|| ManagerError::TenantNotFound {
                tenant_id: tenant_id.to_string(),
            })?;

        let synthetic = entry.synthetic();
        let agent_count = entry.agents.len();
        for (agent_id, mut agent) in entry.agents {
            retire_load(agent.load.take(), synthetic.as_deref(), &agent_id).await;
        }

        self.monitor.clear_tenant(tenant_id);
        info!(tenant_id = %tenant_id, agents = agent_count, "Tenant cleaned up");
        Ok(())
    }

    /// Remove every tenant, returning how many were removed
    pub async fn cleanup_all(&self) -> usize {
        let tenant_ids = self.tenant_ids();
        let mut removed = 0;
        for tenant_id in tenant_ids {
            if self.cleanup_tenant(&tenant_id).await.is_ok() {
                removed += 1;
            }
        }
        removed
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tenants().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn tenant_stats(&self, tenant_id: &str) -> Option<TenantStats> {
        let stats = {
            let tenants = self.tenants();
            let tenant = tenants.get(tenant_id)?;
            let usage = tenant.usage();
            TenantStats {
                tenant_id: tenant_id.to_string(),
                name: tenant.spec.name.clone(),
                agent_count: tenant.agents.len(),
                running_agents: tenant
                    .agents
                    .values()
                    .filter(|a| a.state.is_running())
                    .count(),
                usage,
                limits: tenant.spec.resource_limits,
                over_request_limit: usage.requests_count > tenant.spec.resource_limits.max_requests,
                violation_count: 0,
            }
        };

        let violation_count = self
            .violations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|v| v.tenant_id == tenant_id)
            .count();
        Some(TenantStats {
            violation_count,
            ..stats
        })
    }

    pub fn list_agents(&self, tenant_id: &str) -> Result<Vec<AgentInfo>> {
        let mut tenants = self.tenants();
        let tenant = Self::tenant_mut(&mut tenants, tenant_id)?;
        Ok(tenant.agents.values().map(|a| a.info()).collect())
    }

    pub fn agent(&self, tenant_id: &str, agent_id: &str) -> Result<AgentInfo> {
        let mut tenants = self.tenants();
        let tenant = Self::tenant_mut(&mut tenants, tenant_id)?;
        Ok(tenant.agent_mut(agent_id)?.info())
    }

    /// Static limit violations raised so far
    pub fn violations(&self) -> Vec<Violation> {
        self.violations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Drop for TenantAgentManager {
    fn drop(&mut self) {
        let tenants = self.tenants.get_mut().unwrap_or_else(|e| e.into_inner());
        for tenant in tenants.values_mut() {
            for agent in tenant.agents.values_mut() {
                agent.abort_load();
            }
        }
    }
}

/// Abort a load generator, wait for it to exit, then withdraw its contribution
async fn retire_load(
    load: Option<JoinHandle<()>>,
    synthetic: Option<&SyntheticProcess>,
    agent_id: &str,
) {
    if let Some(handle) = load {
        handle.abort();
        let _ = handle.await;
    }
    if let Some(process) = synthetic {
        process.clear_contribution(agent_id);
    }
}
