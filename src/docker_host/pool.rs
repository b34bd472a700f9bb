//! Per-host client cache, grounded on `AgentPool`'s `DashMap<String,
//! Arc<AgentConnection>>` (`crates/cluster/src/agent/pool.rs`) — §9 Design
//! Notes allows pooling by host address even though each per-host call
//! could construct its client inline.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::TlsConfig;
use crate::error::DockerHostError;

use super::client::DockerHostClient;
use super::DockerHostOps;

/// Resolves a host address to a connected ops handle. `GroupContext` and
/// `Sensor` hold this as `Arc<dyn HostPool>` so the live, mTLS-backed
/// `HostClientPool` and a test double can sit behind the same field (the
/// same `ConsulOps`/`DockerHostOps` live/fake split applied one level up).
pub trait HostPool: Send + Sync {
    fn get_ops(&self, host_addr: &str) -> Result<Arc<dyn DockerHostOps>, DockerHostError>;
}

pub struct HostClientPool {
    connections: DashMap<String, Arc<DockerHostClient>>,
    tls: TlsConfig,
}

impl HostClientPool {
    pub fn new(tls: TlsConfig) -> Self {
        Self {
            connections: DashMap::new(),
            tls,
        }
    }

    pub fn get(&self, host_addr: &str) -> Result<Arc<DockerHostClient>, DockerHostError> {
        if let Some(existing) = self.connections.get(host_addr) {
            return Ok(existing.clone());
        }
        let client = Arc::new(DockerHostClient::connect(host_addr, &self.tls)?);
        self.connections.insert(host_addr.to_string(), client.clone());
        Ok(client)
    }

    pub fn remove(&self, host_addr: &str) {
        self.connections.remove(host_addr);
    }
}

impl HostPool for HostClientPool {
    fn get_ops(&self, host_addr: &str) -> Result<Arc<dyn DockerHostOps>, DockerHostError> {
        let client = self.get(host_addr)?;
        Ok(client as Arc<dyn DockerHostOps>)
    }
}
