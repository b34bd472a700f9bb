//! §4.H — resolving a `hostRef` to the container-host record it names.
//!
//! Ported from the repeated inline loop in
//! `examples/original_source/tarantool.py` (`for host in docker_hosts: if
//! host['addr'].split(':')[0] == docker_host or host['consul_host'] ==
//! docker_host: ...`), centralized here per spec §4.H instead of being
//! re-written at every call site.

use crate::error::LifecycleError;
use crate::model::{Host, HostRef};

pub fn resolve_host<'a>(hosts: &'a [Host], host_ref: &HostRef) -> Result<&'a Host, LifecycleError> {
    hosts
        .iter()
        .find(|h| h.matches(host_ref))
        .ok_or_else(|| LifecycleError::NotFound(format!("no such host: {host_ref}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HealthState;

    fn host(addr: &str, node: &str) -> Host {
        Host {
            addr: addr.to_string(),
            coordination_node: node.to_string(),
            status: HealthState::Passing,
            cpus: 4,
            memory_gib: 16.0,
            residual_memory_gib: 16.0,
        }
    }

    #[test]
    fn resolves_by_address_or_node_name() {
        let hosts = vec![host("10.0.0.1:2375", "node-a"), host("10.0.0.2:2375", "node-b")];
        assert_eq!(
            resolve_host(&hosts, &HostRef::Address("10.0.0.2".to_string())).unwrap().coordination_node,
            "node-b"
        );
        assert_eq!(
            resolve_host(&hosts, &HostRef::NodeName("node-a".to_string())).unwrap().addr,
            "10.0.0.1:2375"
        );
    }

    #[test]
    fn missing_host_is_not_found() {
        let hosts = vec![host("10.0.0.1:2375", "node-a")];
        assert!(resolve_host(&hosts, &HostRef::NodeName("node-z".to_string())).is_err());
    }
}
