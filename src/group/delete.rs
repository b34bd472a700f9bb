//! Delete (§4.F): reverse order of Create — containers, then services,
//! then allocation, then blueprint. Each step is a no-op when its
//! precondition view is empty (missing intermediate state tolerated).
//! Grounded on `Tarantool.delete` in
//! `examples/original_source/tarantool.py`.

use crate::error::LifecycleError;
use crate::model::GroupId;
use crate::projection;
use crate::task::{TaskKind, TaskLog};

use super::GroupContext;

pub async fn delete(ctx: &GroupContext, group_id: GroupId) -> Result<TaskLog, LifecycleError> {
    let mut task = TaskLog::new(format!("delete-{group_id}"), TaskKind::Delete, group_id.clone());
    match delete_inner(ctx, &group_id, &mut task).await {
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

async fn delete_inner(ctx: &GroupContext, gid: &GroupId, task: &mut TaskLog) -> Result<(), LifecycleError> {
    let snapshot = ctx.snapshot();
    let network_name = snapshot.network_settings().network_name.clone();
    let blueprint = projection::blueprint(&snapshot, gid);

    task.log("removing containers");
    for view in projection::containers(&snapshot, gid, &network_name) {
        let client = ctx.host(&view.host)?;
        if let Err(e) = client.stop_container(&view.container_id).await {
            if !LifecycleError::from(e).is_not_found() {
                tracing::warn!(container = %view.container_id, "failed to stop container during delete");
            }
        }
        match client.remove_container(&view.container_id).await {
            Ok(()) => {}
            Err(e) => {
                let err = LifecycleError::from(e);
                if !err.is_not_found() {
                    return Err(err);
                }
                task.log(format!("container {} already absent", view.container_id));
            }
        }
    }
    task.log("deregistering services");
    for view in projection::services(&snapshot, gid) {
        deregister_idempotent(ctx, &view.service_id, task).await?;
        for suffix in ["_replication", "_memory"] {
            let check_id = format!("{}{suffix}", view.service_id);
            let _ = ctx.consul.agent_check_deregister(&check_id).await;
        }
    }

    task.log("deleting allocation");
    ctx.consul.kv_delete(&format!("tarantool/{gid}/allocation/"), true).await?;

    task.log("deleting blueprint");
    ctx.consul.kv_delete(&format!("tarantool/{gid}/blueprint/"), true).await?;

    // Not part of spec.md's IP pool contract (only `allocate` is consumed
    // there); added per SPEC_FULL.md so a create+delete cycle doesn't
    // permanently leak the two addresses Create obtained.
    if let Some(blueprint) = blueprint {
        for addr in blueprint.instances.values() {
            if let Err(e) = ctx.ip_pool.release(*addr).await {
                tracing::warn!(address = %addr, error = %e, "failed to release instance address back to ip pool");
            }
        }
    }

    ctx.refresh().await?;
    Ok(())
}

async fn deregister_idempotent(ctx: &GroupContext, service_id: &str, task: &mut TaskLog) -> Result<(), LifecycleError> {
    match ctx.consul.agent_service_deregister(service_id).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let err = LifecycleError::from(e);
            if err.is_not_found() {
                task.log(format!("service {service_id} already absent"));
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

