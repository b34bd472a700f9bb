//! Rename (§4.F): idempotent write of `blueprint/name`.

use crate::error::LifecycleError;
use crate::model::GroupId;
use crate::task::{TaskKind, TaskLog};

use super::GroupContext;

pub async fn rename(ctx: &GroupContext, group_id: GroupId, new_name: String) -> Result<TaskLog, LifecycleError> {
    let mut task = TaskLog::new(format!("rename-{group_id}"), TaskKind::Rename, group_id.clone());
    task.log(format!("renaming to {new_name}"));
    match ctx.consul.kv_put(&format!("tarantool/{group_id}/blueprint/name"), &new_name).await {
        Ok(()) => {
            ctx.refresh().await?;
            task.finish_success();
            Ok(task)
        }
        Err(e) => {
            let err = LifecycleError::from(e);
            task.finish_critical(err.to_string());
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consul::fake::FakeConsul;
    use crate::docker_host::pool::HostClientPool;
    use crate::ip_pool::StaticIpPool;
    use crate::snapshot::cache::Sensor;
    use std::sync::Arc;
    use std::time::Duration;

    fn ctx() -> GroupContext {
        let consul = Arc::new(FakeConsul::new());
        let host_pool = Arc::new(HostClientPool::new(crate::config::TlsConfig::default()));
        let sensor = Arc::new(Sensor::new(consul.clone(), host_pool.clone(), Duration::from_secs(10), Duration::from_secs(10)));
        GroupContext {
            consul,
            host_pool,
            sensor,
            ip_pool: Arc::new(StaticIpPool::new(vec![])),
            call_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn second_rename_wins_last_write() {
        let ctx = ctx();
        let gid = GroupId("g1".to_string());
        rename(&ctx, gid.clone(), "x".to_string()).await.unwrap();
        rename(&ctx, gid.clone(), "y".to_string()).await.unwrap();
        let value = ctx.consul.kv_get(&format!("tarantool/{gid}/blueprint/name"), false, None).await.unwrap();
        assert_eq!(value.1[0].value, "y");
    }
}
