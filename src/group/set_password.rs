//! SetPassword (§4.F): exec the image helper to set
//! `TARANTOOL_USER_PASSWORD` on each existing container.

use crate::error::LifecycleError;
use crate::model::GroupId;
use crate::projection;
use crate::task::{TaskKind, TaskLog};

use super::GroupContext;

pub async fn set_password(ctx: &GroupContext, group_id: GroupId, password: String) -> Result<TaskLog, LifecycleError> {
    let mut task = TaskLog::new(format!("set-password-{group_id}"), TaskKind::SetPassword, group_id.clone());
    match set_password_inner(ctx, &group_id, &password, &mut task).await {
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

async fn set_password_inner(ctx: &GroupContext, gid: &GroupId, password: &str, task: &mut TaskLog) -> Result<(), LifecycleError> {
    let snapshot = ctx.snapshot();
    let network_name = snapshot.network_settings().network_name.clone();
    let containers = projection::containers(&snapshot, gid, &network_name);

    for instance in crate::model::InstanceNum::all() {
        let Some(view) = containers.iter().find(|c| c.instance == instance) else {
            task.log(format!("instance {instance} has no container, skipping"));
            continue;
        };
        let client = ctx.host(&view.host)?;
        task.log(format!("setting password on instance {instance}"));
        let result = client
            .exec(&view.container_id, vec!["set-config".to_string(), "TARANTOOL_USER_PASSWORD".to_string(), password.to_string()])
            .await?;
        if result.exit_code != 0 {
            return Err(LifecycleError::ExecFailed(format!("set-config exited {} for instance {instance}", result.exit_code)));
        }
    }

    Ok(())
}
