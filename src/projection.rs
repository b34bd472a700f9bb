//! Group projection (§4.E) — derives the four views for a group from a
//! snapshot by matching KV keys, service entries, and container entries
//! against the patterns in §6.1/§6.2/§6.3. Mirrors
//! `Sense.blueprints`/`allocations`/`services`/`containers` in
//! `examples/original_source/sense.py`, typed instead of dict-shaped.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::model::{Allocation, Blueprint, ContainerView, GroupId, HealthState, HostRef, InstanceNum, ServiceView, TARANTOOL_LABEL};
use crate::snapshot::Snapshot;

/// Parses `tarantool/<gid>/blueprint/...` keys for one group. A group with
/// any missing required key projects to `None` ("group absent", §6.1).
pub fn blueprint(snapshot: &Snapshot, group_id: &GroupId) -> Option<Blueprint> {
    let prefix = format!("tarantool/{}/blueprint/", group_id.0);
    let mut kind = None;
    let mut name = None;
    let mut memsize = None;
    let mut check_period = None;
    let mut creation_time = None;
    let mut instances: HashMap<InstanceNum, Ipv4Addr> = HashMap::new();

    for (key, value) in snapshot.kv.iter() {
        let Some(rest) = key.strip_prefix(&prefix) else { continue };
        match rest {
            "type" => kind = Some(value.clone()),
            "name" => name = Some(value.clone()),
            "memsize" => memsize = value.parse::<f64>().ok(),
            "check_period" => check_period = value.parse::<u32>().ok(),
            "creation_time" => creation_time = chrono::DateTime::parse_from_rfc3339(value).ok().map(|t| t.with_timezone(&chrono::Utc)),
            other => {
                if let Some(n) = other.strip_prefix("instances/").and_then(|r| r.strip_suffix("/addr")) {
                    if let (Ok(n), Ok(addr)) = (InstanceNum::from_str(n), value.parse::<Ipv4Addr>()) {
                        instances.insert(n, addr);
                    }
                }
            }
        }
    }

    if instances.len() != 2 {
        return None;
    }

    Some(Blueprint {
        group_id: group_id.clone(),
        kind: kind?,
        name: name?,
        memsize: memsize?,
        check_period: check_period?,
        creation_time: creation_time?,
        instances,
    })
}

/// Parses `tarantool/<gid>/allocation/instances/<n>/host` keys.
pub fn allocation(snapshot: &Snapshot, group_id: &GroupId) -> Option<Allocation> {
    let prefix = format!("tarantool/{}/allocation/instances/", group_id.0);
    let mut instances: HashMap<InstanceNum, HostRef> = HashMap::new();

    for (key, value) in snapshot.kv.iter() {
        let Some(rest) = key.strip_prefix(&prefix) else { continue };
        if let Some(n) = rest.strip_suffix("/host") {
            if let Ok(n) = InstanceNum::from_str(n) {
                let host_ref = if snapshot.docker_hosts().iter().any(|h| h.coordination_node == *value) {
                    HostRef::NodeName(value.clone())
                } else {
                    HostRef::Address(value.clone())
                };
                instances.insert(n, host_ref);
            }
        }
    }

    if instances.is_empty() {
        return None;
    }

    Some(Allocation { group_id: group_id.clone(), instances })
}

/// Service entries whose id has the form `<gid>_<n>` and whose tags
/// include `tarantool` (§4.E, §6.2).
pub fn services(snapshot: &Snapshot, group_id: &GroupId) -> Vec<ServiceView> {
    let entries = match snapshot.services.get(TARANTOOL_LABEL) {
        Some(e) => e,
        None => return Vec::new(),
    };
    let prefix = format!("{}_", group_id.0);
    entries
        .iter()
        .filter(|e| e.tags.iter().any(|t| t == TARANTOOL_LABEL))
        .filter_map(|e| {
            let n = e.service_id.strip_prefix(&prefix)?;
            let instance = InstanceNum::from_str(n).ok()?;
            let address = e.service_address.parse::<Ipv4Addr>().ok()?;
            let status = HealthState::aggregate(e.checks.iter().map(|c| match c.status.as_str() {
                "critical" => HealthState::Critical,
                "warning" => HealthState::Warning,
                _ => HealthState::Passing,
            }));
            Some(ServiceView {
                service_id: e.service_id.clone(),
                group_id: group_id.clone(),
                instance,
                address,
                status,
            })
        })
        .collect()
}

/// Container entries matching `/<gid>_<n>` with a `tarantool` label
/// (§4.E, §6.3). `address` is taken from the named network's IPAM
/// assignment; `is_running` from `State == "running"`.
pub fn containers(snapshot: &Snapshot, group_id: &GroupId, network_name: &str) -> Vec<ContainerView> {
    let suffix_prefix = format!("/{}_", group_id.0);
    let mut out = Vec::new();
    for (host, containers) in snapshot.containers_by_host.iter() {
        for c in containers {
            if !c.labels.contains_key(TARANTOOL_LABEL) {
                continue;
            }
            let Some(name) = c.names.iter().find_map(|n| n.strip_prefix(&suffix_prefix)) else { continue };
            let Ok(instance) = InstanceNum::from_str(name) else { continue };
            let address = c
                .networks
                .get(network_name)
                .and_then(|ip| ip.as_ref())
                .and_then(|ip| ip.parse::<Ipv4Addr>().ok());
            out.push(ContainerView {
                container_id: c.id.clone(),
                group_id: group_id.clone(),
                instance,
                host: host.clone(),
                address,
                is_running: c.state == "running",
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::RawContainer;
    use std::collections::HashMap as Map;

    fn snapshot_with_blueprint() -> Snapshot {
        let mut kv = Map::new();
        kv.insert("tarantool/g1/blueprint/type".to_string(), "tarantool".to_string());
        kv.insert("tarantool/g1/blueprint/name".to_string(), "g1".to_string());
        kv.insert("tarantool/g1/blueprint/memsize".to_string(), "0.5".to_string());
        kv.insert("tarantool/g1/blueprint/check_period".to_string(), "10".to_string());
        kv.insert("tarantool/g1/blueprint/creation_time".to_string(), "2026-01-01T00:00:00Z".to_string());
        kv.insert("tarantool/g1/blueprint/instances/1/addr".to_string(), "10.0.0.1".to_string());
        kv.insert("tarantool/g1/blueprint/instances/2/addr".to_string(), "10.0.0.2".to_string());
        Snapshot { kv, ..Default::default() }
    }

    #[test]
    fn blueprint_requires_both_instance_addrs() {
        let snap = snapshot_with_blueprint();
        let bp = blueprint(&snap, &GroupId("g1".to_string())).unwrap();
        assert_eq!(bp.instances.len(), 2);
        assert_eq!(bp.memsize, 0.5);
    }

    #[test]
    fn missing_required_key_projects_to_group_absent() {
        let mut snap = snapshot_with_blueprint();
        snap.kv.remove("tarantool/g1/blueprint/name");
        assert!(blueprint(&snap, &GroupId("g1".to_string())).is_none());
    }

    #[test]
    fn containers_filter_by_label_and_name_suffix() {
        let mut containers_by_host = Map::new();
        let mut labels = Map::new();
        labels.insert(TARANTOOL_LABEL.to_string(), String::new());
        let mut networks = Map::new();
        networks.insert("tnt-net".to_string(), Some("10.0.0.1".to_string()));
        containers_by_host.insert(
            "host-a".to_string(),
            vec![RawContainer {
                id: "c1".to_string(),
                names: vec!["/g1_1".to_string()],
                labels,
                state: "running".to_string(),
                networks,
            }],
        );
        let snap = Snapshot { containers_by_host, ..Default::default() };
        let views = containers(&snap, &GroupId("g1".to_string()), "tnt-net");
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].instance, InstanceNum::One);
        assert!(views[0].is_running);
        assert_eq!(views[0].address, Some("10.0.0.1".parse().unwrap()));
    }
}
