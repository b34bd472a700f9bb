//! In-memory coordination store for tests, grounded on the
//! live/fake-implementation split the teacher uses for `DockerOps`
//! (`crates/agent/src/client/{live,fake}.rs`).

use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Mutex;

use crate::error::ConsulError;

use super::{CatalogNode, ConsulOps, HealthCheck, HealthEntry, KvEntry, ServiceRegistration};

#[derive(Debug, Default)]
struct Registered {
    registration: ServiceRegistration,
    check_status: Vec<String>,
}

#[derive(Default)]
pub struct FakeConsul {
    kv: Mutex<BTreeMap<String, String>>,
    services: Mutex<BTreeMap<String, Registered>>,
    nodes: Mutex<Vec<CatalogNode>>,
    index: Mutex<u64>,
}

impl FakeConsul {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(self, node: &str, address: &str) -> Self {
        self.nodes.lock().unwrap().push(CatalogNode {
            node: node.to_string(),
            address: address.to_string(),
        });
        self
    }

    pub fn put_sync(&self, key: &str, value: &str) {
        self.kv.lock().unwrap().insert(key.to_string(), value.to_string());
        *self.index.lock().unwrap() += 1;
    }

    pub fn get_sync(&self, key: &str) -> Option<String> {
        self.kv.lock().unwrap().get(key).cloned()
    }

    pub fn service_ids(&self) -> Vec<String> {
        self.services.lock().unwrap().keys().cloned().collect()
    }
}

impl ConsulOps for FakeConsul {
    fn kv_get<'a>(
        &'a self,
        prefix: &'a str,
        recurse: bool,
        index: Option<u64>,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<(u64, Vec<KvEntry>), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            let kv = self.kv.lock().unwrap();
            let entries: Vec<KvEntry> = kv
                .iter()
                .filter(|(k, _)| if recurse { k.starts_with(prefix) } else { k.as_str() == prefix })
                .map(|(k, v)| KvEntry { key: k.clone(), value: v.clone() })
                .collect();
            let idx = *self.index.lock().unwrap();
            let _ = index;
            Ok((idx, entries))
        })
    }

    fn kv_put<'a>(&'a self, key: &'a str, value: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            self.put_sync(key, value);
            Ok(())
        })
    }

    fn kv_delete<'a>(&'a self, prefix: &'a str, recurse: bool) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            let mut kv = self.kv.lock().unwrap();
            if recurse {
                kv.retain(|k, _| !k.starts_with(prefix));
            } else {
                kv.remove(prefix);
            }
            *self.index.lock().unwrap() += 1;
            Ok(())
        })
    }

    fn catalog_services(&self) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<String>, ConsulError>> + Send + '_>> {
        Box::pin(async move {
            let services = self.services.lock().unwrap();
            Ok(services.values().map(|r| r.registration.name.clone()).collect())
        })
    }

    fn catalog_nodes(&self) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<CatalogNode>, ConsulError>> + Send + '_>> {
        Box::pin(async move { Ok(self.nodes.lock().unwrap().clone()) })
    }

    fn health_service<'a>(&'a self, name: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<HealthEntry>, ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            let services = self.services.lock().unwrap();
            Ok(services
                .values()
                .filter(|r| r.registration.name == name)
                .map(|r| HealthEntry {
                    service_id: r.registration.id.clone(),
                    service_address: r.registration.address.clone(),
                    node: "fake-node".to_string(),
                    tags: r.registration.tags.clone(),
                    checks: r
                        .registration
                        .checks
                        .iter()
                        .zip(r.check_status.iter())
                        .map(|(c, status)| HealthCheck { check_id: c.check_id.clone(), status: status.clone() })
                        .collect(),
                })
                .collect())
        })
    }

    fn agent_service_register<'a>(&'a self, registration: ServiceRegistration) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            let status: Vec<String> = registration.checks.iter().map(|c| c.initial_status.clone()).collect();
            self.services.lock().unwrap().insert(
                registration.id.clone(),
                Registered { registration, check_status: status },
            );
            Ok(())
        })
    }

    fn agent_service_deregister<'a>(&'a self, service_id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            self.services.lock().unwrap().remove(service_id);
            Ok(())
        })
    }

    fn agent_check_deregister<'a>(&'a self, check_id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), ConsulError>> + Send + 'a>> {
        Box::pin(async move {
            let mut services = self.services.lock().unwrap();
            for r in services.values_mut() {
                r.registration.checks.retain(|c| c.check_id != check_id);
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let consul = FakeConsul::new();
        consul.kv_put("tarantool/g1/blueprint/name", "g1").await.unwrap();
        let (_idx, entries) = consul.kv_get("tarantool/g1/", true, None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, "g1");
    }

    #[tokio::test]
    async fn delete_recurse_removes_subtree() {
        let consul = FakeConsul::new();
        consul.kv_put("tarantool/g1/blueprint/name", "g1").await.unwrap();
        consul.kv_put("tarantool/g1/allocation/instances/1/host", "h1").await.unwrap();
        consul.kv_delete("tarantool/g1/", true).await.unwrap();
        let (_idx, entries) = consul.kv_get("tarantool/g1/", true, None).await.unwrap();
        assert!(entries.is_empty());
    }
}
