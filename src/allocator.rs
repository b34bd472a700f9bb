//! Placement allocator (§4.D) — chooses a host honoring memory capacity
//! and anti-affinity.

use crate::error::AllocatorError;
use crate::model::{GroupId, Host, HealthState, HostRef};
use crate::projection;
use crate::snapshot::Snapshot;

/// Residual memory per host after subtracting what every already-placed
/// group's blueprint reserves there — the allocator, not the snapshot,
/// owns this computation because it requires walking every group's
/// blueprint/allocation pair, not just one host's raw container list.
pub fn hosts_with_residual_capacity(snapshot: &Snapshot) -> Vec<Host> {
    let mut hosts = snapshot.docker_hosts();

    let mut reserved: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    for group_id in group_ids(snapshot) {
        let Some(bp) = projection::blueprint(snapshot, &group_id) else { continue };
        let Some(alloc) = projection::allocation(snapshot, &group_id) else { continue };
        for host_ref in alloc.instances.values() {
            if let Some(host) = hosts.iter().find(|h| h.matches(host_ref)) {
                *reserved.entry(host.addr.clone()).or_insert(0.0) += bp.memsize;
            }
        }
    }

    for host in hosts.iter_mut() {
        let used = reserved.get(&host.addr).copied().unwrap_or(0.0);
        host.residual_memory_gib = (host.memory_gib - used).max(0.0);
    }
    hosts
}

fn group_ids(snapshot: &Snapshot) -> Vec<GroupId> {
    let mut ids: Vec<GroupId> = snapshot
        .kv
        .keys()
        .filter_map(|k| k.strip_prefix("tarantool/"))
        .filter_map(|rest| rest.split('/').next())
        .map(|gid| GroupId(gid.to_string()))
        .collect();
    ids.sort();
    ids.dedup();
    ids
}

/// `allocate(memsize, anti_affinity)` — returns a host address from the set
/// of passing hosts with enough residual memory and not in `anti_affinity`.
/// Tie-break: largest residual memory, ties broken by host address.
pub fn allocate(hosts: &[Host], memsize: f64, anti_affinity: &[HostRef]) -> Result<HostRef, AllocatorError> {
    let candidate = hosts
        .iter()
        .filter(|h| h.status == HealthState::Passing)
        .filter(|h| h.residual_memory_gib >= memsize)
        .filter(|h| !anti_affinity.iter().any(|a| h.matches(a)))
        .max_by(|a, b| {
            a.residual_memory_gib
                .partial_cmp(&b.residual_memory_gib)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.addr.cmp(&b.addr))
        });

    candidate
        .map(|h| HostRef::Address(h.addr.clone()))
        .ok_or_else(|| AllocatorError::Capacity {
            memsize,
            excluded: anti_affinity.iter().map(|h| h.to_string()).collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(addr: &str, residual: f64) -> Host {
        Host {
            addr: addr.to_string(),
            coordination_node: format!("node-{addr}"),
            status: HealthState::Passing,
            cpus: 4,
            memory_gib: residual,
            residual_memory_gib: residual,
        }
    }

    #[test]
    fn picks_largest_residual_memory_host() {
        let hosts = vec![host("10.0.0.1", 2.0), host("10.0.0.2", 8.0)];
        let chosen = allocate(&hosts, 1.0, &[]).unwrap();
        assert_eq!(chosen, HostRef::Address("10.0.0.2".to_string()));
    }

    #[test]
    fn ties_broken_by_address() {
        let hosts = vec![host("10.0.0.2", 4.0), host("10.0.0.1", 4.0)];
        let chosen = allocate(&hosts, 1.0, &[]).unwrap();
        assert_eq!(chosen, HostRef::Address("10.0.0.2".to_string()));
    }

    #[test]
    fn anti_affinity_excludes_peer_host() {
        let hosts = vec![host("10.0.0.1", 8.0), host("10.0.0.2", 4.0)];
        let chosen = allocate(&hosts, 1.0, &[HostRef::Address("10.0.0.1".to_string())]).unwrap();
        assert_eq!(chosen, HostRef::Address("10.0.0.2".to_string()));
    }

    #[test]
    fn no_qualifying_host_is_a_capacity_error() {
        let hosts = vec![host("10.0.0.1", 0.1)];
        assert!(allocate(&hosts, 1.0, &[]).is_err());
    }
}
