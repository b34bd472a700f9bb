//! Group lifecycle engine (§4.F) — Create/Delete/Heal/Rename/Resize/
//! Reconfigure/Upgrade/SetPassword, each grounded step-by-step on the
//! matching method of `Tarantool` in
//! `examples/original_source/tarantool.py`, adapted from imperative Python
//! with module-level state to an explicit `&GroupContext` handed to every
//! procedure — the same dependency-injection shape
//! `crates/cluster/src/state.rs::AppState` uses for its own handlers.

pub mod create;
pub mod delete;
pub mod heal;
pub mod lock;
pub mod reconfigure;
pub mod rename;
pub mod resize;
pub mod set_password;
pub mod upgrade;

use std::sync::Arc;
use std::time::Duration;

use crate::consul::ConsulOps;
use crate::docker_host::pool::HostPool;
use crate::docker_host::timeout::TimeoutDockerHost;
use crate::docker_host::DockerHostOps;
use crate::error::DockerHostError;
use crate::ip_pool::IpPool;
use crate::snapshot::cache::Sensor;
use crate::snapshot::Snapshot;

/// Everything a lifecycle procedure needs, handed in by the caller instead
/// of read from module-level globals the way
/// `examples/original_source/tarantool.py` reads `global_env`.
pub struct GroupContext {
    pub consul: Arc<dyn ConsulOps>,
    pub host_pool: Arc<dyn HostPool>,
    pub sensor: Arc<Sensor>,
    pub ip_pool: Arc<dyn IpPool>,
    pub call_timeout: Duration,
}

impl GroupContext {
    /// Every transition ends with a refresh so the next step observes its
    /// own effects (§4.F "State machine of a group").
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, crate::error::LifecycleError> {
        self.sensor.update().await?;
        Ok(self.sensor.current())
    }

    /// Resolves a host address to an ops handle bounded by `call_timeout`
    /// (spec.md §5) — every lifecycle procedure reaches a container host
    /// through this instead of `host_pool.get_ops` directly so no RPC can
    /// block past the configured per-call bound.
    pub fn host(&self, host_addr: &str) -> Result<Arc<dyn DockerHostOps>, DockerHostError> {
        let ops = self.host_pool.get_ops(host_addr)?;
        Ok(Arc::new(TimeoutDockerHost::new(ops, self.call_timeout)) as Arc<dyn DockerHostOps>)
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.sensor.current()
    }
}

/// §8 — the literal end-to-end scenarios, run against `FakeConsul` /
/// `FakeDockerHost` / `FakeHostPool` instead of a live coordination store
/// and Docker daemon, the same integration-style approach the teacher uses
/// for its own `DockerOps` fakes.
#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::consul::fake::FakeConsul;
    use crate::consul::{ConsulOps, ServiceCheck, ServiceRegistration};
    use crate::docker_host::fake::{FakeDockerHost, FakeHostPool};
    use crate::docker_host::DockerHostOps;
    use crate::ip_pool::{IpPool, StaticIpPool};
    use crate::model::{GroupId, InstanceNum, AUTH_SASLDB, TARANTOOL_LABEL};
    use crate::projection;
    use crate::snapshot::cache::Sensor;
    use crate::snapshot::RawContainer;
    use crate::task::TaskStatus;

    use super::*;

    const HOST_A: &str = "10.0.1.1:2375";
    const HOST_B: &str = "10.0.1.2:2375";

    /// Registers two passing `docker` hosts and the network settings every
    /// scenario needs, the fixture `Sense.docker_hosts` assumes in
    /// `examples/original_source/sense.py`.
    async fn harness(ip_addresses: &[&str]) -> (GroupContext, Arc<FakeConsul>, Arc<FakeDockerHost>, Arc<FakeDockerHost>) {
        let consul = Arc::new(FakeConsul::new());
        consul.put_sync("tarantool_settings/network_name", "tnt-net");
        consul.put_sync("tarantool_settings/subnet", "10.0.0.0/24");

        for (id, addr) in [("docker-node-a", HOST_A), ("docker-node-b", HOST_B)] {
            consul
                .agent_service_register(ServiceRegistration {
                    id: id.to_string(),
                    name: "docker".to_string(),
                    tags: vec![],
                    address: addr.to_string(),
                    port: 2375,
                    checks: vec![ServiceCheck {
                        check_id: format!("{id}_alive"),
                        name: "alive".to_string(),
                        script: String::new(),
                        interval_secs: 10,
                        initial_status: "passing".to_string(),
                    }],
                })
                .await
                .unwrap();
        }

        let host_a = Arc::new(FakeDockerHost::new());
        let host_b = Arc::new(FakeDockerHost::new());
        let host_pool = Arc::new(
            FakeHostPool::new()
                .with_host(HOST_A, host_a.clone())
                .with_host(HOST_B, host_b.clone()),
        );

        let sensor = Arc::new(Sensor::new(consul.clone(), host_pool.clone(), Duration::from_secs(10), Duration::from_secs(10)));
        let ip_pool = Arc::new(StaticIpPool::new(ip_addresses.iter().map(|a| a.parse::<Ipv4Addr>().unwrap()).collect()));

        let ctx = GroupContext {
            consul: consul.clone(),
            host_pool,
            sensor,
            ip_pool,
            call_timeout: Duration::from_secs(30),
        };

        (ctx, consul, host_a, host_b)
    }

    /// Overwrites the sensor's cached view with a running container for
    /// each instance in `present`, placed according to the current
    /// allocation — `FakeDockerHost::list_containers` always reports empty,
    /// so this stands in for what a real refresh would observe after
    /// `create`/`heal` actually created the containers.
    async fn seed_containers(ctx: &GroupContext, gid: &GroupId, present: &[InstanceNum]) {
        let snapshot = ctx.snapshot();
        let blueprint = projection::blueprint(&snapshot, gid).expect("blueprint must exist");
        let allocation = projection::allocation(&snapshot, gid).expect("allocation must exist");
        let network_name = snapshot.network_settings().network_name.clone();

        let mut containers_by_host: HashMap<String, Vec<RawContainer>> = HashMap::new();
        for instance in present {
            let host = allocation.instances.get(instance).expect("instance must be allocated").as_str().to_string();
            let addr = blueprint.instances.get(instance).expect("instance must be in blueprint");
            let mut labels = HashMap::new();
            labels.insert(TARANTOOL_LABEL.to_string(), String::new());
            let mut networks = HashMap::new();
            networks.insert(network_name.clone(), Some(addr.to_string()));
            containers_by_host.entry(host).or_default().push(RawContainer {
                id: format!("fake-{}", gid.container_name(*instance)),
                names: vec![format!("/{}", gid.container_name(*instance))],
                labels,
                state: "running".to_string(),
                networks,
            });
        }

        let mut next = (*snapshot).clone();
        next.containers_by_host = containers_by_host;
        ctx.sensor.set_snapshot_for_test(next);
    }

    fn host_for(host_a: &Arc<FakeDockerHost>, host_b: &Arc<FakeDockerHost>, host_addr: &str) -> Arc<FakeDockerHost> {
        if host_addr == HOST_A {
            host_a.clone()
        } else if host_addr == HOST_B {
            host_b.clone()
        } else {
            panic!("unexpected host address {host_addr}");
        }
    }

    fn make_tar_with_entry(name: &str, data: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
        builder.into_inner().unwrap()
    }

    #[tokio::test]
    async fn create_then_delete_round_trips_instance_addresses() {
        let (ctx, consul, host_a, host_b) = harness(&["10.0.2.1", "10.0.2.2"]).await;
        let gid = GroupId("g1".to_string());

        let task = create::create(
            &ctx,
            create::CreateParams {
                group_id: gid.clone(),
                name: "g1".to_string(),
                memsize: 0.5,
                check_period: 10,
                password: Some("p".to_string()),
            },
        )
        .await
        .unwrap();
        assert_eq!(task.status, TaskStatus::Success);

        // Both addresses handed out; the pool is exhausted until delete.
        assert!(ctx.ip_pool.allocate().await.is_err());
        assert_eq!(host_a.container_count() + host_b.container_count(), 2);

        seed_containers(&ctx, &gid, &[InstanceNum::One, InstanceNum::Two]).await;

        let task = delete::delete(&ctx, gid.clone()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Success);

        assert_eq!(host_a.container_count() + host_b.container_count(), 0);
        assert!(consul.service_ids().is_empty());
        let (_, entries) = ctx.consul.kv_get(&format!("tarantool/{gid}/blueprint/"), true, None).await.unwrap();
        assert!(entries.is_empty());

        // Both addresses released back to the pool.
        assert!(ctx.ip_pool.allocate().await.is_ok());
        assert!(ctx.ip_pool.allocate().await.is_ok());
    }

    #[tokio::test]
    async fn heal_recreates_the_missing_instance_from_the_survivor() {
        let (ctx, _consul, host_a, host_b) = harness(&["10.0.2.1", "10.0.2.2"]).await;
        let gid = GroupId("g1".to_string());

        create::create(
            &ctx,
            create::CreateParams {
                group_id: gid.clone(),
                name: "g1".to_string(),
                memsize: 0.5,
                check_period: 10,
                password: None,
            },
        )
        .await
        .unwrap();

        // Instance 2's container is gone; only instance 1 survives.
        seed_containers(&ctx, &gid, &[InstanceNum::One]).await;

        let snapshot = ctx.snapshot();
        let allocation = projection::allocation(&snapshot, &gid).unwrap();
        let surviving_host_addr = allocation.instances.get(&InstanceNum::One).unwrap().as_str().to_string();
        let missing_host_addr = allocation.instances.get(&InstanceNum::Two).unwrap().as_str().to_string();
        let surviving_host = host_for(&host_a, &host_b, &surviving_host_addr);
        let missing_host = host_for(&host_a, &host_b, &missing_host_addr);

        let surviving_container_id = format!("fake-{}", gid.container_name(InstanceNum::One));
        let sasldb = make_tar_with_entry("auth.sasldb", b"credentials");
        surviving_host.put_archive(&surviving_container_id, AUTH_SASLDB, sasldb).await.unwrap();

        let task = heal::heal(&ctx, gid.clone()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Success);

        let recreated_id = format!("fake-{}", gid.container_name(InstanceNum::Two));
        let recreated = missing_host.container(&recreated_id).expect("instance 2 recreated");
        assert!(recreated.running);
        assert!(recreated.spec.env.iter().any(|e| e.starts_with(heal::AUTH_SASLDB_ENV)));
        assert!(recreated.spec.env.iter().any(|e| e.starts_with("TARANTOOL_REPLICATION_SOURCE=")));
    }

    #[tokio::test]
    async fn resize_execs_both_instances_and_persists_memsize() {
        let (ctx, consul, host_a, host_b) = harness(&["10.0.2.1", "10.0.2.2"]).await;
        let gid = GroupId("g1".to_string());

        create::create(
            &ctx,
            create::CreateParams {
                group_id: gid.clone(),
                name: "g1".to_string(),
                memsize: 0.5,
                check_period: 10,
                password: None,
            },
        )
        .await
        .unwrap();
        seed_containers(&ctx, &gid, &[InstanceNum::One, InstanceNum::Two]).await;

        let task = resize::resize(&ctx, gid.clone(), 1.0).await.unwrap();
        assert_eq!(task.status, TaskStatus::Success);

        let mut seen = 0;
        for host in [&host_a, &host_b] {
            for n in 1..=2 {
                if let Some(container) = host.container(&format!("fake-g1_{n}")) {
                    assert_eq!(container.env_overrides.get("TARANTOOL_SLAB_ALLOC_ARENA"), Some(&"1".to_string()));
                    assert!(container.running);
                    seen += 1;
                }
            }
        }
        assert_eq!(seen, 2);

        let (_, entries) = consul.kv_get(&format!("tarantool/{gid}/blueprint/memsize"), false, None).await.unwrap();
        assert_eq!(entries[0].value, "1");
    }

    #[tokio::test]
    async fn set_password_execs_both_instances() {
        let (ctx, _consul, host_a, host_b) = harness(&["10.0.2.1", "10.0.2.2"]).await;
        let gid = GroupId("g1".to_string());

        create::create(
            &ctx,
            create::CreateParams {
                group_id: gid.clone(),
                name: "g1".to_string(),
                memsize: 0.5,
                check_period: 10,
                password: Some("old".to_string()),
            },
        )
        .await
        .unwrap();
        seed_containers(&ctx, &gid, &[InstanceNum::One, InstanceNum::Two]).await;

        let task = set_password::set_password(&ctx, gid.clone(), "new-password".to_string()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Success);

        let mut seen = 0;
        for host in [&host_a, &host_b] {
            for n in 1..=2 {
                if let Some(container) = host.container(&format!("fake-g1_{n}")) {
                    assert_eq!(container.env_overrides.get("TARANTOOL_USER_PASSWORD"), Some(&"new-password".to_string()));
                    seen += 1;
                }
            }
        }
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn reconfigure_deploys_bundle_to_both_instances() {
        let (ctx, _consul, host_a, host_b) = harness(&["10.0.2.1", "10.0.2.2"]).await;
        let gid = GroupId("g1".to_string());

        create::create(
            &ctx,
            create::CreateParams {
                group_id: gid.clone(),
                name: "g1".to_string(),
                memsize: 0.5,
                check_period: 10,
                password: None,
            },
        )
        .await
        .unwrap();
        seed_containers(&ctx, &gid, &[InstanceNum::One, InstanceNum::Two]).await;

        let task = reconfigure::reconfigure(&ctx, gid.clone(), "init.lua".to_string(), b"return {}".to_vec()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Success);

        let mut seen = 0;
        for host in [&host_a, &host_b] {
            for n in 1..=2 {
                if let Some(container) = host.container(&format!("fake-g1_{n}")) {
                    assert_eq!(container.archives.len(), 1);
                    seen += 1;
                }
            }
        }
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn reconfigure_rejects_unsupported_bundle_before_touching_any_host() {
        let (ctx, _consul, host_a, host_b) = harness(&["10.0.2.1", "10.0.2.2"]).await;
        let gid = GroupId("g1".to_string());

        create::create(
            &ctx,
            create::CreateParams {
                group_id: gid.clone(),
                name: "g1".to_string(),
                memsize: 0.5,
                check_period: 10,
                password: None,
            },
        )
        .await
        .unwrap();
        seed_containers(&ctx, &gid, &[InstanceNum::One, InstanceNum::Two]).await;

        let err = reconfigure::reconfigure(&ctx, gid.clone(), "bundle.zip".to_string(), b"whatever".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::LifecycleError::Validation(_)));
        let total_archives: usize = [&host_a, &host_b]
            .iter()
            .flat_map(|h| (1..=2).filter_map(|n| h.container(&format!("fake-g1_{n}"))))
            .map(|c| c.archives.len())
            .sum();
        assert_eq!(total_archives, 0);
    }

    #[tokio::test]
    async fn upgrade_recreates_both_instances_on_the_current_image() {
        let (ctx, _consul, host_a, host_b) = harness(&["10.0.2.1", "10.0.2.2"]).await;
        let gid = GroupId("g1".to_string());

        create::create(
            &ctx,
            create::CreateParams {
                group_id: gid.clone(),
                name: "g1".to_string(),
                memsize: 0.5,
                check_period: 10,
                password: None,
            },
        )
        .await
        .unwrap();
        seed_containers(&ctx, &gid, &[InstanceNum::One, InstanceNum::Two]).await;

        let task = upgrade::upgrade(&ctx, gid.clone()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Success);

        let mut seen = 0;
        for host in [&host_a, &host_b] {
            for n in 1..=2 {
                if let Some(container) = host.container(&format!("fake-g1_{n}")) {
                    assert!(container.running);
                    assert!(container.spec.env.iter().any(|e| e == "TARANTOOL_SLAB_ALLOC_ARENA=0.5"));
                    seen += 1;
                }
            }
        }
        assert_eq!(seen, 2);
    }
}
