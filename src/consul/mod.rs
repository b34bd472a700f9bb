//! Coordination-store client (§4.A) — hierarchical KV, catalog, health and
//! agent registration, reached over the store's HTTP API.
//!
//! `ConsulOps` is object-safe the same way the teacher's `DockerOps` trait
//! is (`client/docker.rs`): every method returns a boxed, pinned future so
//! trait objects can be stored behind `Arc<dyn ConsulOps>` and swapped for a
//! fake in tests.

mod client;
pub mod fake;

use std::pin::Pin;

pub use client::ConsulClient;

use crate::error::ConsulError;

/// One KV entry as returned by `kv_get`. `value` is `None` when the key
/// exists but carries no value, which the model never distinguishes from
/// the empty string (§4.A: absent values are empty strings, never null).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogNode {
    pub node: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub check_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEntry {
    pub service_id: String,
    pub service_address: String,
    pub node: String,
    pub tags: Vec<String>,
    pub checks: Vec<HealthCheck>,
}

#[derive(Debug, Clone)]
pub struct ServiceCheck {
    pub check_id: String,
    pub name: String,
    pub script: String,
    pub interval_secs: u32,
    pub initial_status: String,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceRegistration {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub address: String,
    pub port: u16,
    pub checks: Vec<ServiceCheck>,
}

type BoxFut<'a, T> = Pin<Box<dyn std::future::Future<Output = Result<T, ConsulError>> + Send + 'a>>;

pub trait ConsulOps: Send + Sync {
    /// Blocks (on the blocking-index endpoint) when `index` is `Some` and
    /// the store supports it; returns the new index and the current entries.
    fn kv_get<'a>(
        &'a self,
        prefix: &'a str,
        recurse: bool,
        index: Option<u64>,
    ) -> BoxFut<'a, (u64, Vec<KvEntry>)>;

    fn kv_put<'a>(&'a self, key: &'a str, value: &'a str) -> BoxFut<'a, ()>;

    fn kv_delete<'a>(&'a self, prefix: &'a str, recurse: bool) -> BoxFut<'a, ()>;

    fn catalog_services(&self) -> BoxFut<'_, Vec<String>>;

    fn catalog_nodes(&self) -> BoxFut<'_, Vec<CatalogNode>>;

    fn health_service<'a>(&'a self, name: &'a str) -> BoxFut<'a, Vec<HealthEntry>>;

    fn agent_service_register<'a>(&'a self, registration: ServiceRegistration) -> BoxFut<'a, ()>;

    fn agent_service_deregister<'a>(&'a self, service_id: &'a str) -> BoxFut<'a, ()>;

    fn agent_check_deregister<'a>(&'a self, check_id: &'a str) -> BoxFut<'a, ()>;
}
