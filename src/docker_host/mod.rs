//! Container-host client (§4.B) — one `bollard`-backed client per remote
//! Docker daemon, reached over mutual TLS.
//!
//! `DockerHostOps` is object-safe the same way the teacher's `DockerOps`
//! trait is: boxed, pinned futures so a live client and a fake test double
//! can sit behind the same `Arc<dyn DockerHostOps>`.

pub mod client;
pub mod fake;
pub mod pool;
pub mod resolve;
pub mod timeout;

use std::collections::HashMap;
use std::pin::Pin;

use crate::error::DockerHostError;

#[derive(Debug, Clone, Default)]
pub struct CreateContainerSpec {
    pub name: String,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub env: Vec<String>,
    pub network: String,
    pub ipv4: String,
    pub binds: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: i64,
    pub stdout: String,
}

#[derive(Debug, Clone)]
pub struct SystemInfoView {
    pub cpus: u32,
    pub memory_gib: f64,
}

type BoxFut<'a, T> = Pin<Box<dyn std::future::Future<Output = Result<T, DockerHostError>> + Send + 'a>>;

pub trait DockerHostOps: Send + Sync {
    fn list_containers(&self) -> BoxFut<'_, Vec<bollard::models::ContainerSummary>>;

    fn info(&self) -> BoxFut<'_, SystemInfoView>;

    fn list_networks(&self) -> BoxFut<'_, Vec<bollard::models::Network>>;

    fn create_network<'a>(&'a self, name: &'a str, subnet: Option<&'a str>) -> BoxFut<'a, ()>;

    fn ensure_network<'a>(&'a self, name: &'a str, subnet: Option<&'a str>) -> BoxFut<'a, ()>;

    fn ensure_image<'a>(&'a self, image: &'a str) -> BoxFut<'a, ()>;

    fn create_container<'a>(&'a self, spec: CreateContainerSpec) -> BoxFut<'a, String>;

    fn connect_to_network<'a>(&'a self, network: &'a str, container: &'a str, ipv4: &'a str) -> BoxFut<'a, ()>;

    fn start_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()>;

    fn stop_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()>;

    fn restart_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()>;

    fn remove_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()>;

    fn inspect_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, bollard::models::ContainerInspectResponse>;

    fn exec<'a>(&'a self, container_id: &'a str, cmd: Vec<String>) -> BoxFut<'a, ExecResult>;

    fn put_archive<'a>(&'a self, container_id: &'a str, dest: &'a str, tar_bytes: Vec<u8>) -> BoxFut<'a, ()>;

    fn get_archive<'a>(&'a self, container_id: &'a str, path: &'a str) -> BoxFut<'a, Vec<u8>>;
}
