//! Upgrade (§4.F): recreate each container against the current image,
//! preserving every bind mount except `/opt/tarantool` (application code
//! lives in the new image). Instance 1 then instance 2, instance 2 using
//! instance 1 as replication source.

use crate::docker_host::CreateContainerSpec;
use crate::error::LifecycleError;
use crate::model::{GroupId, InstanceNum, OPT_TARANTOOL, TARANTOOL_IMAGE, TARANTOOL_LABEL, TARANTOOL_PORT};
use crate::projection;
use crate::task::{TaskKind, TaskLog};

use super::create::enable_replication;
use super::GroupContext;

fn binds_to_preserve(inspect: &bollard::models::ContainerInspectResponse) -> Vec<String> {
    inspect
        .host_config
        .as_ref()
        .and_then(|hc| hc.binds.clone())
        .unwrap_or_default()
        .into_iter()
        .filter(|b| b.split(':').nth(1) != Some(OPT_TARANTOOL))
        .collect()
}

pub async fn upgrade(ctx: &GroupContext, group_id: GroupId) -> Result<TaskLog, LifecycleError> {
    let mut task = TaskLog::new(format!("upgrade-{group_id}"), TaskKind::Upgrade, group_id.clone());
    match upgrade_inner(ctx, &group_id, &mut task).await {
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

async fn upgrade_inner(ctx: &GroupContext, gid: &GroupId, task: &mut TaskLog) -> Result<(), LifecycleError> {
    let snapshot = ctx.snapshot();
    let network_name = snapshot.network_settings().network_name.clone();
    let subnet = snapshot.network_settings().subnet.clone();
    let blueprint = projection::blueprint(&snapshot, gid).ok_or_else(|| LifecycleError::NotFound(format!("group absent: {gid}")))?;
    let containers = projection::containers(&snapshot, gid, &network_name);

    let mut instance_1_addr = None;

    for instance in InstanceNum::all() {
        let Some(view) = containers.iter().find(|c| c.instance == instance) else {
            task.log(format!("instance {instance} has no container, skipping upgrade"));
            continue;
        };
        let addr = *blueprint.instances.get(&instance).ok_or_else(|| LifecycleError::NotFound("blueprint missing instance addr".into()))?;
        let client = ctx.host(&view.host)?;

        task.log(format!("inspecting instance {instance} before upgrade"));
        let inspected = client.inspect_container(&view.container_id).await?;
        let preserved_binds = binds_to_preserve(&inspected);

        task.log(format!("stopping and removing instance {instance}"));
        client.stop_container(&view.container_id).await?;
        client.remove_container(&view.container_id).await?;

        client.ensure_image(TARANTOOL_IMAGE).await?;
        client.ensure_network(&network_name, Some(&subnet)).await?;

        let mut labels = std::collections::HashMap::new();
        labels.insert(TARANTOOL_LABEL.to_string(), String::new());
        let mut env = vec![
            format!("TARANTOOL_SLAB_ALLOC_ARENA={}", blueprint.memsize),
            "TARANTOOL_USER_NAME=tarantool".to_string(),
        ];
        if instance == InstanceNum::Two {
            if let Some(peer_addr) = instance_1_addr {
                env.push(format!("TARANTOOL_REPLICATION_SOURCE={peer_addr}:{TARANTOOL_PORT}"));
            }
        }

        let spec = CreateContainerSpec {
            name: gid.container_name(instance),
            image: TARANTOOL_IMAGE.to_string(),
            labels,
            env,
            network: network_name.clone(),
            ipv4: addr.to_string(),
            binds: preserved_binds,
        };

        task.log(format!("recreating instance {instance} on the current image"));
        let id = client.create_container(spec).await?;
        client.connect_to_network(&network_name, &id, &addr.to_string()).await?;
        client.start_container(&id).await?;

        if instance == InstanceNum::Two {
            if let Some(peer_addr) = instance_1_addr {
                task.log("re-enabling replication on upgraded instance 2");
                enable_replication(client.as_ref(), &id, &format!("{peer_addr}:{TARANTOOL_PORT}")).await?;
            }
        }

        if instance == InstanceNum::One {
            instance_1_addr = Some(addr);
        }
    }

    ctx.refresh().await?;
    Ok(())
}
