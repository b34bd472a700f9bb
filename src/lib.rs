//! Reconciliation engine for a control plane that provisions, heals,
//! resizes, reconfigures, and tears down paired replicated in-memory
//! database instances across a fleet of container hosts.
//!
//! The binary (`main.rs`) is a thin composition root; everything else
//! lives here so it can be exercised directly by tests without a running
//! process.

pub mod allocator;
pub mod config;
pub mod consul;
pub mod docker_host;
pub mod error;
pub mod group;
pub mod ip_pool;
pub mod model;
pub mod projection;
pub mod retry;
pub mod snapshot;
pub mod task;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::ControlPlaneConfig;
use crate::consul::ConsulClient;
use crate::docker_host::pool::HostClientPool;
use crate::group::lock::GroupLocks;
use crate::group::GroupContext;
use crate::ip_pool::IpPool;
use crate::snapshot::cache::Sensor;

/// Everything the process wires up once at startup and hands to every
/// request: the coordination-store client, the per-host client pool, the
/// sensor, the per-group lock registry, and the IP pool, same
/// dependency-injection shape as the teacher's `AppState`
/// (`crates/cluster/src/state.rs`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ControlPlaneConfig>,
    pub sensor: Arc<Sensor>,
    pub group_locks: Arc<GroupLocks>,
    pub shutdown_tx: watch::Sender<bool>,
    group_ctx_template: GroupContextTemplate,
}

/// The pieces that back a fresh [`GroupContext`] per lifecycle call. Kept
/// separate from `GroupContext` itself so every call gets its own value
/// (the sensor snapshot reference is re-read per call) while sharing the
/// same underlying clients.
#[derive(Clone)]
struct GroupContextTemplate {
    consul: Arc<dyn consul::ConsulOps>,
    host_pool: Arc<dyn docker_host::pool::HostPool>,
    ip_pool: Arc<dyn IpPool>,
    call_timeout: Duration,
}

impl AppState {
    /// Builds the shared client set from configuration, the same two-phase
    /// "construct, then connect" shape as `AppState::new`/`initialize` in
    /// `crates/cluster/src/state.rs`. `ip_pool` is handed in because its
    /// implementation lives outside this crate's scope (spec.md §1: "the
    /// IP-pool helper — only its `allocate` contract is consumed").
    pub fn new(config: ControlPlaneConfig, ip_pool: Arc<dyn IpPool>) -> anyhow::Result<Self> {
        let consul: Arc<dyn consul::ConsulOps> = Arc::new(ConsulClient::new(
            config.consul.base_url.clone(),
            config.consul.acl_token.clone(),
            config.consul.request_timeout(),
        )?);
        let host_pool: Arc<dyn docker_host::pool::HostPool> = Arc::new(HostClientPool::new(config.tls.clone()));
        let sensor = Arc::new(Sensor::new(
            consul.clone(),
            host_pool.clone(),
            Duration::from_secs(config.sensor.refresh_interval_secs),
            Duration::from_secs(config.sensor.error_backoff_secs),
        ));
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config.clone()),
            sensor,
            group_locks: Arc::new(GroupLocks::new()),
            shutdown_tx,
            group_ctx_template: GroupContextTemplate {
                consul,
                host_pool,
                ip_pool,
                call_timeout: config.call_timeout(),
            },
        })
    }

    /// Performs the first synchronous snapshot refresh so lifecycle
    /// operations issued immediately after startup don't race an empty
    /// snapshot, then spawns the two background loops (§5).
    pub async fn initialize(&self) -> anyhow::Result<()> {
        self.sensor.update().await?;

        let sensor = self.sensor.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            sensor.timer_update(shutdown_rx).await;
        });

        let consul = self.group_ctx_template.consul.clone();
        let sensor = self.sensor.clone();
        let backoff = Duration::from_secs(self.config.sensor.error_backoff_secs);
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            snapshot::watch::watch_loop(consul, sensor, backoff, shutdown_rx).await;
        });

        Ok(())
    }

    /// Builds a fresh [`GroupContext`] for one lifecycle call, reading the
    /// sensor's current snapshot reference at call time.
    pub fn group_context(&self) -> GroupContext {
        GroupContext {
            consul: self.group_ctx_template.consul.clone(),
            host_pool: self.group_ctx_template.host_pool.clone(),
            sensor: self.sensor.clone(),
            ip_pool: self.group_ctx_template.ip_pool.clone(),
            call_timeout: self.group_ctx_template.call_timeout,
        }
    }

    /// Runs one lifecycle procedure against `group_id` while holding that
    /// group's lock for the duration of `f` (§5: lifecycle operations on
    /// the same `group_id` never run concurrently; operations on
    /// different groups do, since each group gets its own `Mutex` entry in
    /// [`GroupLocks`]). The REST/CLI surface that dispatches `create`,
    /// `delete`, `heal`, and friends (out of scope here, spec.md §1) is
    /// expected to route every lifecycle call through this one entry point
    /// rather than calling [`Self::group_context`] directly.
    pub async fn run_exclusive<F, Fut, T>(&self, group_id: &crate::model::GroupId, f: F) -> T
    where
        F: FnOnce(GroupContext) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let _guard = self.group_locks.acquire(group_id).await;
        f(self.group_context()).await
    }

    /// Signals the background loops to stop; does not wait for them.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::ip_pool::StaticIpPool;
    use crate::model::GroupId;

    use super::*;

    fn test_state() -> AppState {
        AppState::new(ControlPlaneConfig::default(), Arc::new(StaticIpPool::new(vec![]))).unwrap()
    }

    /// §5: same-`group_id` lifecycle calls never overlap. Two calls racing
    /// on `g1` must never both be inside the guarded section at once; a
    /// call on `g2` is free to run concurrently with either.
    #[tokio::test]
    async fn run_exclusive_serializes_same_group_but_not_different_groups() {
        let state = test_state();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let mark = |in_flight: Arc<AtomicUsize>, max_in_flight: Arc<AtomicUsize>| async move {
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        };

        let g1 = GroupId("g1".to_string());
        let (a, b) = tokio::join!(
            state.run_exclusive(&g1, |_ctx| mark(in_flight.clone(), max_in_flight.clone())),
            state.run_exclusive(&g1, |_ctx| mark(in_flight.clone(), max_in_flight.clone())),
        );
        let _ = (a, b);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1, "same-group calls must not overlap");

        max_in_flight.store(0, Ordering::SeqCst);
        let g2 = GroupId("g2".to_string());
        let (a, b) = tokio::join!(
            state.run_exclusive(&g1, |_ctx| mark(in_flight.clone(), max_in_flight.clone())),
            state.run_exclusive(&g2, |_ctx| mark(in_flight.clone(), max_in_flight.clone())),
        );
        let _ = (a, b);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 2, "different-group calls may overlap");
    }
}
