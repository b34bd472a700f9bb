use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bollard::models::ContainerSummary;
use tokio::sync::watch as shutdown_watch;

use crate::consul::ConsulOps;
use crate::docker_host::pool::HostPool;

use super::{NetworkSettings, RawContainer, Snapshot};

/// Owns the current snapshot and knows how to refresh it (§4.C).
pub struct Sensor {
    consul: Arc<dyn ConsulOps>,
    host_pool: Arc<dyn HostPool>,
    snapshot: RwLock<Arc<Snapshot>>,
    refresh_interval: Duration,
    error_backoff: Duration,
}

fn parse_bool(s: &str) -> bool {
    s.eq_ignore_ascii_case("true")
}

fn container_from_summary(c: ContainerSummary) -> RawContainer {
    let networks = c
        .network_settings
        .and_then(|ns| ns.networks)
        .map(|nets| {
            nets.into_iter()
                .map(|(name, settings)| (name, settings.and_then(|s| s.ip_address)))
                .collect()
        })
        .unwrap_or_default();

    RawContainer {
        id: c.id.unwrap_or_default(),
        names: c.names.unwrap_or_default(),
        labels: c.labels.unwrap_or_default(),
        state: c.state.unwrap_or_default(),
        networks,
    }
}

impl Sensor {
    pub fn new(consul: Arc<dyn ConsulOps>, host_pool: Arc<dyn HostPool>, refresh_interval: Duration, error_backoff: Duration) -> Self {
        Self {
            consul,
            host_pool,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            refresh_interval,
            error_backoff,
        }
    }

    pub fn current(&self) -> Arc<Snapshot> {
        self.snapshot.read().unwrap().clone()
    }

    /// Synchronous full refresh (§4.C steps 1-4). Builds the whole next
    /// snapshot before swapping the pointer so readers never observe a
    /// torn view.
    pub async fn update(&self) -> Result<(), crate::error::ConsulError> {
        // (1) tarantool/ and tarantool_settings/ KV subtrees.
        let (_idx, tarantool_entries) = self.consul.kv_get("tarantool/", true, None).await?;
        let (_idx, settings_entries) = self.consul.kv_get("tarantool_settings/", true, None).await?;

        let mut kv = HashMap::new();
        for e in tarantool_entries {
            kv.insert(e.key, e.value);
        }

        let mut settings = NetworkSettings::default();
        for e in &settings_entries {
            match e.key.as_str() {
                "tarantool_settings/network_name" => settings.network_name = e.value.clone(),
                "tarantool_settings/subnet" => settings.subnet = e.value.clone(),
                "tarantool_settings/create_automatically" => settings.create_automatically = parse_bool(&e.value),
                _ => {}
            }
        }

        // (2) every service and its health entries.
        let service_names = self.consul.catalog_services().await?;
        let mut services = HashMap::new();
        for name in service_names {
            let entries = self.consul.health_service(&name).await?;
            services.insert(name, entries);
        }

        // (3) for every passing `docker` service entry, open a container-host
        // client and fetch containers + info.
        let mut containers_by_host = HashMap::new();
        let mut host_info = HashMap::new();
        if let Some(docker_entries) = services.get("docker") {
            for entry in docker_entries {
                if !entry.checks.iter().all(|c| c.status == "passing") {
                    continue;
                }
                let client = match self.host_pool.get_ops(&entry.service_address) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!(host = %entry.service_address, error = %e, "skipping unreachable container host during refresh");
                        continue;
                    }
                };
                match client.list_containers().await {
                    Ok(containers) => {
                        containers_by_host.insert(
                            entry.service_address.clone(),
                            containers.into_iter().map(container_from_summary).collect(),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(host = %entry.service_address, error = %e, "failed to list containers during refresh");
                    }
                }
                match client.info().await {
                    Ok(info) => {
                        host_info.insert(entry.service_address.clone(), info);
                    }
                    Err(e) => {
                        tracing::warn!(host = %entry.service_address, error = %e, "failed to fetch host info during refresh");
                    }
                }
            }
        }

        // (4) catalog nodes, then atomic swap.
        let nodes = self.consul.catalog_nodes().await?;

        let next = Arc::new(Snapshot {
            kv,
            settings,
            services,
            containers_by_host,
            host_info,
            nodes,
        });

        *self.snapshot.write().unwrap() = next;
        Ok(())
    }

    /// Installs a snapshot directly, bypassing `update()`'s own fetch.
    /// `FakeDockerHost::list_containers` always reports empty (§8: it
    /// isn't wired to the containers a test created through
    /// `create_container`/`start_container`), so lifecycle tests that need
    /// an existing container in view use this to seed one after the fact.
    #[cfg(test)]
    pub fn set_snapshot_for_test(&self, snapshot: Snapshot) {
        *self.snapshot.write().unwrap() = Arc::new(snapshot);
    }

    /// Background refresh loop, grounded on
    /// `AgentRegistry::start_health_monitoring`
    /// (`crates/cluster/src/agent/registry.rs`): a fixed-period
    /// `tokio::time::interval` selected against a shutdown signal, errors
    /// logged and retried after a fixed backoff rather than propagated.
    pub async fn timer_update(self: Arc<Self>, mut shutdown_rx: shutdown_watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.refresh_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.update().await {
                        tracing::warn!(error = %e, "snapshot refresh failed, backing off");
                        tokio::time::sleep(self.error_backoff).await;
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("sensor refresh loop shutting down");
                        return;
                    }
                }
            }
        }
    }
}
