//! Sensor / snapshot cache (§4.C) — periodically materializes the
//! coordination store and the container hosts into one immutable,
//! atomically-swapped snapshot.

pub mod cache;
pub mod watch;

use std::collections::HashMap;

use crate::consul::CatalogNode;
use crate::model::{Host, HealthState};

/// One container as seen on a host, the fields [`crate::projection`] needs
/// to derive the container view (§4.E) — trimmed down from
/// `bollard::models::ContainerSummary`.
#[derive(Debug, Clone, Default)]
pub struct RawContainer {
    pub id: String,
    pub names: Vec<String>,
    pub labels: HashMap<String, String>,
    pub state: String,
    /// network name -> assigned IPv4
    pub networks: HashMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct NetworkSettings {
    pub network_name: String,
    pub subnet: String,
    /// §9: `tarantool_settings/create_automatically`, `"true"`/`"false"`,
    /// default `false`.
    pub create_automatically: bool,
}

/// §3 Snapshot — `{kv, settings, services, containers_by_host, host_info, nodes}`.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub kv: HashMap<String, String>,
    pub settings: NetworkSettings,
    /// service name -> health entries, mirrors `Sense.consul_services` in
    /// `examples/original_source/sense.py`.
    pub services: HashMap<String, Vec<crate::consul::HealthEntry>>,
    pub containers_by_host: HashMap<String, Vec<RawContainer>>,
    pub host_info: HashMap<String, crate::docker_host::SystemInfoView>,
    pub nodes: Vec<CatalogNode>,
}

impl Snapshot {
    /// Hosts registered under the `docker` service whose every health check
    /// is passing, enriched with the `info()` call made during refresh.
    /// Mirrors `Sense.docker_hosts` in `sense.py`.
    pub fn docker_hosts(&self) -> Vec<Host> {
        let entries = match self.services.get("docker") {
            Some(entries) => entries,
            None => return Vec::new(),
        };
        entries
            .iter()
            .filter(|e| e.checks.iter().all(|c| c.status == "passing"))
            .map(|e| {
                let info = self.host_info.get(&e.service_address);
                let cpus = info.map(|i| i.cpus).unwrap_or(0);
                let memory_gib = info.map(|i| i.memory_gib).unwrap_or(0.0);
                // Residual capacity accounts for reservations made by already
                // placed groups; the allocator (§4.D) fills this in from the
                // full set of blueprint/allocation pairs, since that requires
                // walking every group, not just this host's raw container list.
                Host {
                    addr: e.service_address.clone(),
                    coordination_node: e.node.clone(),
                    status: HealthState::Passing,
                    cpus,
                    memory_gib,
                    residual_memory_gib: memory_gib,
                }
            })
            .collect()
    }

    /// Coordination nodes, mirrors `Sense.consul_hosts` in `sense.py`.
    pub fn consul_hosts(&self) -> &[CatalogNode] {
        &self.nodes
    }

    pub fn network_settings(&self) -> &NetworkSettings {
        &self.settings
    }
}
