//! Heal (§4.F): invoked when exactly one of the two containers is missing.
//! Grounded on `Tarantool.heal` in
//! `examples/original_source/tarantool.py`.

use std::io::Read;

use base64::Engine;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::docker_host::resolve::resolve_host;
use crate::docker_host::CreateContainerSpec;
use crate::error::LifecycleError;
use crate::model::{GroupId, InstanceNum, AUTH_SASLDB, TARANTOOL_IMAGE, TARANTOOL_LABEL, TARANTOOL_PORT};
use crate::projection;
use crate::task::{TaskKind, TaskLog};

use super::create::enable_replication;
use super::GroupContext;

/// Environment variable carrying the surviving instance's credential
/// store, gzipped and base64-encoded — an addition beyond the container
/// conventions in §6.3, needed to carry §4.F Heal's "propagate it when
/// creating `m`" across the create-container call.
pub const AUTH_SASLDB_ENV: &str = "TARANTOOL_AUTH_SASLDB_GZ_B64";

pub async fn heal(ctx: &GroupContext, group_id: GroupId) -> Result<TaskLog, LifecycleError> {
    let mut task = TaskLog::new(format!("heal-{group_id}"), TaskKind::Heal, group_id.clone());
    match heal_inner(ctx, &group_id, &mut task).await {
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

async fn heal_inner(ctx: &GroupContext, gid: &GroupId, task: &mut TaskLog) -> Result<(), LifecycleError> {
    let snapshot = ctx.snapshot();
    let network_name = snapshot.network_settings().network_name.clone();
    let blueprint = projection::blueprint(&snapshot, gid).ok_or_else(|| LifecycleError::NotFound(format!("group absent: {gid}")))?;
    let allocation = projection::allocation(&snapshot, gid).ok_or_else(|| LifecycleError::NotFound(format!("no allocation for {gid}")))?;
    let containers = projection::containers(&snapshot, gid, &network_name);

    let present: std::collections::HashSet<InstanceNum> = containers.iter().map(|c| c.instance).collect();

    match present.len() {
        2 => {
            task.log("both instances present, heal is a no-op");
            return Ok(());
        }
        0 => {
            return Err(LifecycleError::Precondition(format!("no surviving instance for {gid}")));
        }
        _ => {}
    }

    let surviving = *present.iter().next().unwrap();
    let missing = surviving.peer();
    task.log(format!("instance {missing} missing, healing from surviving instance {surviving}"));

    let hosts = snapshot.docker_hosts();
    let surviving_host = resolve_host(&hosts, allocation.instances.get(&surviving).ok_or_else(|| LifecycleError::NotFound("no allocation for surviving instance".into()))?)?;
    let missing_host = resolve_host(&hosts, allocation.instances.get(&missing).ok_or_else(|| LifecycleError::NotFound("no allocation for missing instance".into()))?)?;

    let surviving_container = containers
        .iter()
        .find(|c| c.instance == surviving)
        .ok_or_else(|| LifecycleError::NotFound("surviving container disappeared mid-heal".into()))?;
    let surviving_client = ctx.host(&surviving_host.addr)?;
    let missing_client = ctx.host(&missing_host.addr)?;

    task.log("downloading credential store from surviving instance");
    let archive = surviving_client.get_archive(&surviving_container.container_id, AUTH_SASLDB).await?;
    let sasldb_bytes = extract_single_entry(&archive).map_err(|e| LifecycleError::Validation(format!("could not extract {AUTH_SASLDB}: {e}")))?;
    let sasldb_gz_b64 = gzip_base64(&sasldb_bytes).map_err(|e| LifecycleError::Validation(e.to_string()))?;

    task.log(format!("deregistering stale service for instance {missing}"));
    let stale_service_id = gid.service_id(missing);
    let _ = ctx.consul.agent_service_deregister(&stale_service_id).await;

    let missing_addr = *blueprint.instances.get(&missing).ok_or_else(|| LifecycleError::NotFound("blueprint missing instance addr".into()))?;
    let surviving_addr = surviving_container.address.ok_or_else(|| LifecycleError::NotFound("surviving container has no address".into()))?;

    missing_client.ensure_image(TARANTOOL_IMAGE).await?;
    missing_client.ensure_network(&network_name, Some(&snapshot.network_settings().subnet)).await?;

    let mut labels = std::collections::HashMap::new();
    labels.insert(TARANTOOL_LABEL.to_string(), String::new());
    let spec = CreateContainerSpec {
        name: gid.container_name(missing),
        image: TARANTOOL_IMAGE.to_string(),
        labels,
        env: vec![
            format!("TARANTOOL_SLAB_ALLOC_ARENA={}", blueprint.memsize),
            "TARANTOOL_USER_NAME=tarantool".to_string(),
            format!("TARANTOOL_REPLICATION_SOURCE={surviving_addr}:{TARANTOOL_PORT}"),
            format!("{AUTH_SASLDB_ENV}={sasldb_gz_b64}"),
        ],
        network: network_name.clone(),
        ipv4: missing_addr.to_string(),
        binds: Vec::new(),
    };

    task.log(format!("recreating container for instance {missing}"));
    let id = missing_client.create_container(spec).await?;
    missing_client.connect_to_network(&network_name, &id, &missing_addr.to_string()).await?;
    missing_client.start_container(&id).await?;

    task.log("enabling replication on recreated instance");
    enable_replication(missing_client.as_ref(), &id, &format!("{surviving_addr}:{TARANTOOL_PORT}")).await?;

    task.log(format!("re-registering service for instance {missing}"));
    let service_id = gid.service_id(missing);
    let registration = crate::consul::ServiceRegistration {
        id: service_id.clone(),
        name: crate::model::TARANTOOL_SERVICE_NAME.to_string(),
        tags: vec![TARANTOOL_LABEL.to_string()],
        address: missing_addr.to_string(),
        port: TARANTOOL_PORT,
        checks: vec![
            crate::consul::ServiceCheck {
                check_id: format!("{service_id}_replication"),
                name: "replication".to_string(),
                script: crate::model::REPLICATION_CHECK_SCRIPT.to_string(),
                interval_secs: blueprint.check_period,
                initial_status: "warning".to_string(),
            },
            crate::consul::ServiceCheck {
                check_id: format!("{service_id}_memory"),
                name: "Memory Utilization".to_string(),
                script: crate::model::MEMORY_CHECK_SCRIPT.to_string(),
                interval_secs: blueprint.check_period,
                initial_status: "warning".to_string(),
            },
        ],
    };
    ctx.consul.agent_service_register(registration).await?;

    ctx.refresh().await?;
    Ok(())
}

fn extract_single_entry(tar_bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut archive = tar::Archive::new(tar_bytes);
    let mut entries = archive.entries()?;
    let mut entry = entries.next().ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "empty archive"))??;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

fn gzip_base64(bytes: &[u8]) -> std::io::Result<String> {
    use std::io::Write;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    let gz = encoder.finish()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(gz))
}
