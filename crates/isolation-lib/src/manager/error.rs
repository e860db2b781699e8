use super::AgentState;
use thiserror::Error;

/// Failures of tenant and agent lifecycle operations
#[derive(Debug, Error, PartialEq)]
pub enum ManagerError {
    #[error("tenant {tenant_id} not found")]
    TenantNotFound { tenant_id: String },

    #[error("agent {agent_id} not found in tenant {tenant_id}")]
    AgentNotFound { tenant_id: String, agent_id: String },

    #[error("tenant {tenant_id} already exists")]
    TenantExists { tenant_id: String },

    #[error("agent {agent_id} already exists in tenant {tenant_id}")]
    AgentExists { tenant_id: String, agent_id: String },

    #[error("tenant {tenant_id} already has the maximum of {max_agents} agents")]
    AgentLimitReached { tenant_id: String, max_agents: usize },

    #[error("cannot {action} agent {agent_id} in state {state}")]
    InvalidTransition {
        agent_id: String,
        state: AgentState,
        action: &'static str,
    },

    #[error("tenant {tenant_id} has no synthetic process to drive")]
    NoSyntheticProcess { tenant_id: String },

    #[error("no tokio runtime available to run the load generator")]
    NoRuntime,
}
