//! In-memory service registry.

use std::{collections::HashMap, sync::Arc};

use gate_session_core::{RpcInvoker, ServiceResolver};
use parking_lot::RwLock;

/// In-memory registry of gate endpoints.
///
/// Useful for single-process deployments and tests, where every gate
/// lives in the same process as its proxies.
pub struct MemoryRegistry {
    servers: RwLock<HashMap<String, Arc<dyn RpcInvoker>>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(HashMap::new()),
        }
    }

    /// Register an endpoint, returning the one it replaced.
    pub fn register(
        &self,
        server_id: impl Into<String>,
        endpoint: Arc<dyn RpcInvoker>,
    ) -> Option<Arc<dyn RpcInvoker>> {
        let server_id = server_id.into();
        tracing::debug!("Registering gate endpoint {server_id}");
        self.servers.write().insert(server_id, endpoint)
    }

    /// Remove an endpoint.
    pub fn deregister(&self, server_id: &str) -> Option<Arc<dyn RpcInvoker>> {
        let removed = self.servers.write().remove(server_id);
        if removed.is_some() {
            tracing::debug!("Deregistered gate endpoint {server_id}");
        }
        removed
    }

    /// Registered server ids, sorted.
    #[must_use]
    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.read().is_empty()
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceResolver for MemoryRegistry {
    fn server_by_id(&self, server_id: &str) -> Option<Arc<dyn RpcInvoker>> {
        self.servers.read().get(server_id).map(Arc::clone)
    }
}
