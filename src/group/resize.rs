//! Resize (§4.F): exec the image helper to set `TARANTOOL_SLAB_ALLOC_ARENA`
//! on each existing container, restart it, then persist the new memsize.
//! Absent containers are skipped with an informational log rather than
//! failing (§8 boundary behavior).

use crate::error::LifecycleError;
use crate::model::GroupId;
use crate::projection;
use crate::task::{TaskKind, TaskLog};

use super::GroupContext;

pub async fn resize(ctx: &GroupContext, group_id: GroupId, new_memsize: f64) -> Result<TaskLog, LifecycleError> {
    let mut task = TaskLog::new(format!("resize-{group_id}"), TaskKind::Resize, group_id.clone());
    match resize_inner(ctx, &group_id, new_memsize, &mut task).await {
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

async fn resize_inner(ctx: &GroupContext, gid: &GroupId, new_memsize: f64, task: &mut TaskLog) -> Result<(), LifecycleError> {
    let snapshot = ctx.snapshot();
    let network_name = snapshot.network_settings().network_name.clone();
    let containers = projection::containers(&snapshot, gid, &network_name);

    for instance in crate::model::InstanceNum::all() {
        let Some(view) = containers.iter().find(|c| c.instance == instance) else {
            task.log(format!("instance {instance} has no container, skipping resize"));
            continue;
        };
        let client = ctx.host(&view.host)?;
        task.log(format!("resizing instance {instance} to {new_memsize} GiB"));
        let result = client
            .exec(&view.container_id, vec!["set-config".to_string(), "TARANTOOL_SLAB_ALLOC_ARENA".to_string(), new_memsize.to_string()])
            .await?;
        if result.exit_code != 0 {
            return Err(LifecycleError::ExecFailed(format!("set-config exited {} for instance {instance}", result.exit_code)));
        }
        client.restart_container(&view.container_id).await?;
    }

    task.log("persisting new memsize");
    ctx.consul.kv_put(&format!("tarantool/{gid}/blueprint/memsize"), &new_memsize.to_string()).await?;
    ctx.refresh().await?;
    Ok(())
}
