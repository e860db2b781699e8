//! Tenant-to-process bindings

use crate::collector::ProcessHandle;
use dashmap::DashMap;
use tracing::debug;

/// Registry of tenant process bindings, at most one per tenant
#[derive(Default)]
pub struct ProcessRegistry {
    bindings: DashMap<String, ProcessHandle>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a tenant to a process, replacing any previous binding
    pub fn register(&self, tenant_id: &str, process: ProcessHandle) {
        debug!(tenant_id = %tenant_id, process = %process.describe(), "Registering tenant process");
        if let Some(previous) = self.bindings.insert(tenant_id.to_string(), process) {
            debug!(tenant_id = %tenant_id, replaced = %previous.describe(), "Replaced existing binding");
        }
    }

    pub fn unregister(&self, tenant_id: &str) -> Option<ProcessHandle> {
        debug!(tenant_id = %tenant_id, "Unregistering tenant process");
        self.bindings.remove(tenant_id).map(|(_, v)| v)
    }

    pub fn get(&self, tenant_id: &str) -> Option<ProcessHandle> {
        self.bindings.get(tenant_id).map(|r| r.value().clone())
    }

    /// Copy of all bindings, so callers can sample without holding shard locks
    pub fn list(&self) -> Vec<(String, ProcessHandle)> {
        self.bindings
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }

    pub fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.bindings.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SyntheticProcess;
    use std::sync::Arc;

    #[test]
    fn test_reregistration_replaces() {
        let registry = ProcessRegistry::new();
        registry.register("t1", Arc::new(SyntheticProcess::new("first")));
        registry.register("t1", Arc::new(SyntheticProcess::new("second")));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("t1").unwrap().describe(), "synthetic second");
    }

    #[test]
    fn test_unregister() {
        let registry = ProcessRegistry::new();
        registry.register("t1", Arc::new(SyntheticProcess::new("p")));
        registry.register("t2", Arc::new(SyntheticProcess::new("q")));

        assert!(registry.unregister("t1").is_some());
        assert!(registry.unregister("t1").is_none());
        assert_eq!(registry.tenant_ids(), vec!["t2".to_string()]);
    }
}
