//! Per-group mutual exclusion (§5): lifecycle operations on the same
//! `group_id` never run concurrently; operations on different groups do.
//! Grounded on the `DashMap<String, Arc<...>>` shape of
//! `crates/cluster/src/agent/pool.rs::AgentPool` — a lock entry is created
//! on demand per group and dropped automatically when the guard goes out
//! of scope.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::GroupId;

#[derive(Default)]
pub struct GroupLocks {
    locks: DashMap<GroupId, Arc<Mutex<()>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, group_id: &GroupId) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(group_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn different_groups_do_not_contend() {
        let locks = GroupLocks::new();
        let g1 = GroupId("g1".to_string());
        let g2 = GroupId("g2".to_string());
        let guard1 = locks.acquire(&g1).await;
        let acquired_g2 = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&g2)).await;
        assert!(acquired_g2.is_ok());
        drop(guard1);
    }

    #[tokio::test]
    async fn same_group_serializes() {
        let locks = GroupLocks::new();
        let g1 = GroupId("g1".to_string());
        let guard1 = locks.acquire(&g1).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&g1)).await;
        assert!(blocked.is_err());
        drop(guard1);
    }
}
