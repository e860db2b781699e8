//! Agent instance lifecycle and resource accounting

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::task::JoinHandle;

/// Lifecycle state of a tenant agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Created but never started
    #[default]
    Created,
    Running,
    /// Was running, now stopped; may be started again
    Stopped,
}

impl AgentState {
    pub fn can_start(&self) -> bool {
        matches!(self, AgentState::Created | AgentState::Stopped)
    }

    pub fn can_stop(&self) -> bool {
        matches!(self, AgentState::Running)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, AgentState::Running)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::Created => write!(f, "created"),
            AgentState::Running => write!(f, "running"),
            AgentState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Resource usage reported for one agent, or summed for a tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResources {
    pub memory_mb: f64,
    pub cpu_usage: f64,
    pub requests_count: u64,
}

impl AgentResources {
    pub fn sum<'a>(items: impl IntoIterator<Item = &'a AgentResources>) -> AgentResources {
        items
            .into_iter()
            .fold(AgentResources::default(), |acc, r| AgentResources {
                memory_mb: acc.memory_mb + r.memory_mb,
                cpu_usage: acc.cpu_usage + r.cpu_usage,
                requests_count: acc.requests_count + r.requests_count,
            })
    }
}

/// Read-only view of an agent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentInfo {
    pub agent_id: String,
    pub tenant_id: String,
    pub state: AgentState,
    pub resources: AgentResources,
    pub created_at: f64,
    pub started_at: Option<f64>,
    pub generating_load: bool,
}

pub(crate) struct AgentInstance {
    pub(crate) agent_id: String,
    pub(crate) tenant_id: String,
    pub(crate) state: AgentState,
    pub(crate) resources: AgentResources,
    pub(crate) created_at: f64,
    pub(crate) started_at: Option<f64>,
    pub(crate) load: Option<JoinHandle<()>>,
}

impl AgentInstance {
    pub(crate) fn new(tenant_id: &str, agent_id: &str, created_at: f64) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            tenant_id: tenant_id.to_string(),
            state: AgentState::Created,
            resources: AgentResources::default(),
            created_at,
            started_at: None,
            load: None,
        }
    }

    /// Abort the load generator, if any; returns whether one was running
    pub(crate) fn abort_load(&mut self) -> bool {
        match self.load.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn info(&self) -> AgentInfo {
        AgentInfo {
            agent_id: self.agent_id.clone(),
            tenant_id: self.tenant_id.clone(),
            state: self.state,
            resources: self.resources,
            created_at: self.created_at,
            started_at: self.started_at,
            generating_load: self.load.as_ref().map(|h| !h.is_finished()).unwrap_or(false),
        }
    }
}
