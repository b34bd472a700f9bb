//! The four-view state model (§3) plus the small value types the views are
//! built from.

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TARANTOOL_PORT: u16 = 3301;
pub const TARANTOOL_IMAGE: &str = "tarantool-cloud-tarantool:latest";
pub const TARANTOOL_LABEL: &str = "tarantool";
pub const TARANTOOL_SERVICE_NAME: &str = "tarantool";
pub const OPT_TARANTOOL: &str = "/opt/tarantool";
pub const AUTH_SASLDB: &str = "/opt/tarantool/auth.sasldb";
pub const REPLICATION_CHECK_SCRIPT: &str = "/var/lib/mon.d/tarantool_replication.sh";
pub const MEMORY_CHECK_SCRIPT: &str = "/var/lib/mon.d/tarantool_memory.sh";

/// One of the two members of a replica group. Invariant 1: exactly two
/// instances per group, numbered `"1"` and `"2"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceNum {
    One,
    Two,
}

impl InstanceNum {
    pub fn peer(self) -> InstanceNum {
        match self {
            InstanceNum::One => InstanceNum::Two,
            InstanceNum::Two => InstanceNum::One,
        }
    }

    pub fn all() -> [InstanceNum; 2] {
        [InstanceNum::One, InstanceNum::Two]
    }
}

impl fmt::Display for InstanceNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceNum::One => write!(f, "1"),
            InstanceNum::Two => write!(f, "2"),
        }
    }
}

impl FromStr for InstanceNum {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" => Ok(InstanceNum::One),
            "2" => Ok(InstanceNum::Two),
            _ => Err(()),
        }
    }
}

/// Opaque identifier of a replica group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub String);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl GroupId {
    pub fn service_id(&self, n: InstanceNum) -> String {
        format!("{}_{}", self.0, n)
    }

    pub fn container_name(&self, n: InstanceNum) -> String {
        format!("{}_{}", self.0, n)
    }
}

/// A placement target. The allocator records whichever form it resolved;
/// both a container-host network address and a coordination-node name are
/// valid and must both resolve via [`crate::docker_host::resolve`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostRef {
    Address(String),
    NodeName(String),
}

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostRef::Address(a) => write!(f, "{a}"),
            HostRef::NodeName(n) => write!(f, "{n}"),
        }
    }
}

impl HostRef {
    pub fn as_str(&self) -> &str {
        match self {
            HostRef::Address(a) => a,
            HostRef::NodeName(n) => n,
        }
    }
}

/// Desired state of a group (§3 Blueprint), persisted under
/// `tarantool/<gid>/blueprint/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    pub group_id: GroupId,
    pub kind: String,
    pub name: String,
    pub memsize: f64,
    pub check_period: u32,
    pub creation_time: DateTime<Utc>,
    pub instances: HashMap<InstanceNum, Ipv4Addr>,
}

/// Placement decision (§3 Allocation), persisted under
/// `tarantool/<gid>/allocation/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub group_id: GroupId,
    pub instances: HashMap<InstanceNum, HostRef>,
}

impl Allocation {
    /// Invariant 3: the two instances of a group never land on the same host.
    pub fn respects_anti_affinity(&self) -> bool {
        match (
            self.instances.get(&InstanceNum::One),
            self.instances.get(&InstanceNum::Two),
        ) {
            (Some(a), Some(b)) => a.as_str() != b.as_str(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthState {
    Passing,
    Warning,
    Critical,
}

impl HealthState {
    /// Invariant 7 / §8: commutative, associative, `{}` aggregates to passing.
    pub fn aggregate<I: IntoIterator<Item = HealthState>>(states: I) -> HealthState {
        states
            .into_iter()
            .max()
            .unwrap_or(HealthState::Passing)
    }
}

/// Runtime registration of one instance in the coordination store (§3
/// Service record).
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceView {
    pub service_id: String,
    pub group_id: GroupId,
    pub instance: InstanceNum,
    pub address: Ipv4Addr,
    pub status: HealthState,
}

/// Runtime container on a host (§3 Container).
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerView {
    pub container_id: String,
    pub group_id: GroupId,
    pub instance: InstanceNum,
    pub host: String,
    pub address: Option<Ipv4Addr>,
    pub is_running: bool,
}

/// A container host discovered via the coordination store's `docker`
/// service (§3 Host).
#[derive(Debug, Clone, PartialEq)]
pub struct Host {
    pub addr: String,
    pub coordination_node: String,
    pub status: HealthState,
    pub cpus: u32,
    pub memory_gib: f64,
    pub residual_memory_gib: f64,
}

impl Host {
    pub fn matches(&self, r: &HostRef) -> bool {
        match r {
            HostRef::Address(a) => self.addr.split(':').next() == Some(a.split(':').next().unwrap_or(a)),
            HostRef::NodeName(n) => &self.coordination_node == n,
        }
    }
}
