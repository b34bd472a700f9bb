//! Create (§4.F): blueprint → allocation → register → containers →
//! replication. Grounded on `Tarantool.create` in
//! `examples/original_source/tarantool.py`.

use std::time::Duration;

use chrono::Utc;

use crate::allocator;
use crate::consul::{ServiceCheck, ServiceRegistration};
use crate::docker_host::CreateContainerSpec;
use crate::docker_host::resolve::resolve_host;
use crate::error::LifecycleError;
use crate::model::{
    GroupId, HostRef, InstanceNum, MEMORY_CHECK_SCRIPT, REPLICATION_CHECK_SCRIPT, TARANTOOL_IMAGE, TARANTOOL_LABEL,
    TARANTOOL_PORT, TARANTOOL_SERVICE_NAME,
};
use crate::retry::retry;
use crate::task::{TaskKind, TaskLog};

use super::GroupContext;

pub struct CreateParams {
    pub group_id: GroupId,
    pub name: String,
    pub memsize: f64,
    pub check_period: u32,
    pub password: Option<String>,
}

pub async fn create(ctx: &GroupContext, params: CreateParams) -> Result<TaskLog, LifecycleError> {
    let mut task = TaskLog::new(format!("create-{}", params.group_id), TaskKind::Create, params.group_id.clone());
    match create_inner(ctx, &params, &mut task).await {
        Ok(()) => {
            task.finish_success();
            Ok(task)
        }
        Err(e) => {
            task.finish_critical(e.to_string());
            Err(e)
        }
    }
}

async fn create_inner(ctx: &GroupContext, params: &CreateParams, task: &mut TaskLog) -> Result<(), LifecycleError> {
    let gid = &params.group_id;

    // 1. Obtain two fresh IPs.
    task.log("allocating instance addresses from the ip pool");
    let addr1 = ctx.ip_pool.allocate().await.map_err(|e| LifecycleError::Validation(e.to_string()))?;
    let addr2 = ctx.ip_pool.allocate().await.map_err(|e| LifecycleError::Validation(e.to_string()))?;

    // 2. Write blueprint keys one at a time.
    task.log("writing blueprint");
    let prefix = format!("tarantool/{gid}/blueprint");
    ctx.consul.kv_put(&format!("{prefix}/type"), "tarantool").await?;
    ctx.consul.kv_put(&format!("{prefix}/name"), &params.name).await?;
    ctx.consul.kv_put(&format!("{prefix}/memsize"), &params.memsize.to_string()).await?;
    ctx.consul.kv_put(&format!("{prefix}/check_period"), &params.check_period.to_string()).await?;
    ctx.consul.kv_put(&format!("{prefix}/creation_time"), &Utc::now().to_rfc3339()).await?;
    ctx.consul.kv_put(&format!("{prefix}/instances/1/addr"), &addr1.to_string()).await?;
    ctx.consul.kv_put(&format!("{prefix}/instances/2/addr"), &addr2.to_string()).await?;

    // 3. Refresh. Allocate twice with anti-affinity; persist allocation.
    task.log("allocating hosts");
    let snapshot = ctx.refresh().await?;
    let hosts = allocator::hosts_with_residual_capacity(&snapshot);
    let host1 = allocator::allocate(&hosts, params.memsize, &[])?;
    let host2 = allocator::allocate(&hosts, params.memsize, &[host1.clone()])?;

    let alloc_prefix = format!("tarantool/{gid}/allocation/instances");
    ctx.consul.kv_put(&format!("{alloc_prefix}/1/host"), host1.as_str()).await?;
    ctx.consul.kv_put(&format!("{alloc_prefix}/2/host"), host2.as_str()).await?;

    // 4. Refresh. Register both services with two health checks each.
    task.log("registering services");
    ctx.refresh().await?;
    register_service(ctx, gid, InstanceNum::One, addr1, params.check_period).await?;
    register_service(ctx, gid, InstanceNum::Two, addr2, params.check_period).await?;

    // 5. Refresh. Ensure image/network; create both containers.
    task.log("creating containers");
    let snapshot = ctx.refresh().await?;
    let network_name = snapshot.network_settings().network_name.clone();
    let subnet = snapshot.network_settings().subnet.clone();
    let hosts = snapshot.docker_hosts();

    let host1_record = resolve_host(&hosts, &host1)?;
    let host2_record = resolve_host(&hosts, &host2)?;
    let client1 = ctx.host(&host1_record.addr)?;
    let client2 = ctx.host(&host2_record.addr)?;

    client1.ensure_image(TARANTOOL_IMAGE).await?;
    client1.ensure_network(&network_name, Some(&subnet)).await?;
    client2.ensure_image(TARANTOOL_IMAGE).await?;
    client2.ensure_network(&network_name, Some(&subnet)).await?;

    let container1_name = gid.container_name(InstanceNum::One);
    let container2_name = gid.container_name(InstanceNum::Two);

    let spec1 = container_spec(&container1_name, &network_name, addr1.to_string(), params.memsize, params.password.as_deref(), None);
    let id1 = client1.create_container(spec1).await?;
    client1.connect_to_network(&network_name, &id1, &addr1.to_string()).await?;

    let replication_source_2 = format!("{addr1}:{TARANTOOL_PORT}");
    let spec2 = container_spec(&container2_name, &network_name, addr2.to_string(), params.memsize, params.password.as_deref(), Some(&replication_source_2));
    let id2 = client2.create_container(spec2).await?;
    client2.connect_to_network(&network_name, &id2, &addr2.to_string()).await?;

    client1.start_container(&id1).await?;
    client2.start_container(&id2).await?;

    // 6. Enable replication on each instance, retried 5x at 1s.
    task.log("enabling replication");
    enable_replication(client1.as_ref(), &id1, &format!("{addr2}:{TARANTOOL_PORT}")).await?;
    enable_replication(client2.as_ref(), &id2, &format!("{addr1}:{TARANTOOL_PORT}")).await?;

    ctx.refresh().await?;
    Ok(())
}

fn container_spec(
    name: &str,
    network: &str,
    ipv4: String,
    memsize: f64,
    password: Option<&str>,
    replication_source: Option<&str>,
) -> CreateContainerSpec {
    let mut labels = std::collections::HashMap::new();
    labels.insert(TARANTOOL_LABEL.to_string(), String::new());

    let mut env = vec![
        format!("TARANTOOL_SLAB_ALLOC_ARENA={memsize}"),
        "TARANTOOL_USER_NAME=tarantool".to_string(),
    ];
    if let Some(password) = password {
        env.push(format!("TARANTOOL_USER_PASSWORD={password}"));
    }
    if let Some(source) = replication_source {
        env.push(format!("TARANTOOL_REPLICATION_SOURCE={source}"));
    }

    CreateContainerSpec {
        name: name.to_string(),
        image: TARANTOOL_IMAGE.to_string(),
        labels,
        env,
        network: network.to_string(),
        ipv4,
        binds: Vec::new(),
    }
}

async fn register_service(ctx: &GroupContext, gid: &GroupId, instance: InstanceNum, addr: std::net::Ipv4Addr, check_period: u32) -> Result<(), LifecycleError> {
    let service_id = gid.service_id(instance);
    let registration = ServiceRegistration {
        id: service_id.clone(),
        name: TARANTOOL_SERVICE_NAME.to_string(),
        tags: vec![TARANTOOL_LABEL.to_string()],
        address: addr.to_string(),
        port: TARANTOOL_PORT,
        checks: vec![
            ServiceCheck {
                check_id: format!("{service_id}_replication"),
                name: "replication".to_string(),
                script: REPLICATION_CHECK_SCRIPT.to_string(),
                interval_secs: check_period,
                initial_status: "warning".to_string(),
            },
            ServiceCheck {
                check_id: format!("{service_id}_memory"),
                name: "Memory Utilization".to_string(),
                script: MEMORY_CHECK_SCRIPT.to_string(),
                interval_secs: check_period,
                initial_status: "warning".to_string(),
            },
        ],
    };
    ctx.consul.agent_service_register(registration).await?;
    Ok(())
}

/// §4.F step 6 / §5: bounded retry, 5 attempts at 1s, ended by exit code 0.
/// Also used by [`super::heal`] and [`super::upgrade`] when they recreate a
/// container and need to re-establish replication.
pub(super) async fn enable_replication(client: &dyn crate::docker_host::DockerHostOps, container_id: &str, peer_addr: &str) -> Result<(), LifecycleError> {
    retry(5, Duration::from_secs(1), || async {
        let result = client
            .exec(container_id, vec!["set-config".to_string(), "TARANTOOL_REPLICATION_SOURCE".to_string(), peer_addr.to_string()])
            .await
            .map_err(LifecycleError::from)?;
        if result.exit_code == 0 {
            Ok(())
        } else {
            Err(LifecycleError::ExecFailed(format!("set-config exited {}", result.exit_code)))
        }
    })
    .await
}
