//! In-memory container-host double, grounded on the live/fake split the
//! teacher uses for `DockerOps` (`crates/agent/src/client/fake.rs`).

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::error::DockerHostError;

use super::pool::HostPool;
use super::{CreateContainerSpec, DockerHostOps, ExecResult, SystemInfoView};

#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub spec: CreateContainerSpec,
    pub running: bool,
    pub env_overrides: HashMap<String, String>,
    pub archives: HashMap<String, Vec<u8>>,
}

#[derive(Default)]
pub struct FakeDockerHost {
    containers: Mutex<HashMap<String, FakeContainer>>,
    networks: Mutex<Vec<String>>,
    images: Mutex<Vec<String>>,
    pub next_exec_exit_code: Mutex<i64>,
}

impl FakeDockerHost {
    pub fn new() -> Self {
        Self {
            next_exec_exit_code: Mutex::new(0),
            ..Default::default()
        }
    }

    pub fn container(&self, id: &str) -> Option<FakeContainer> {
        self.containers.lock().unwrap().get(id).cloned()
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }
}

impl DockerHostOps for FakeDockerHost {
    fn list_containers(&self) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<bollard::models::ContainerSummary>, DockerHostError>> + Send + '_>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn info(&self) -> Pin<Box<dyn std::future::Future<Output = Result<SystemInfoView, DockerHostError>> + Send + '_>> {
        Box::pin(async move { Ok(SystemInfoView { cpus: 4, memory_gib: 16.0 }) })
    }

    fn list_networks(&self) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<bollard::models::Network>, DockerHostError>> + Send + '_>> {
        Box::pin(async move { Ok(Vec::new()) })
    }

    fn create_network<'a>(&'a self, name: &'a str, _subnet: Option<&'a str>) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            self.networks.lock().unwrap().push(name.to_string());
            Ok(())
        })
    }

    fn ensure_network<'a>(&'a self, name: &'a str, subnet: Option<&'a str>) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            if self.networks.lock().unwrap().iter().any(|n| n == name) {
                return Ok(());
            }
            DockerHostOps::create_network(self, name, subnet).await
        })
    }

    fn ensure_image<'a>(&'a self, image: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let mut images = self.images.lock().unwrap();
            if !images.iter().any(|i| i == image) {
                images.push(image.to_string());
            }
            Ok(())
        })
    }

    fn create_container<'a>(&'a self, spec: CreateContainerSpec) -> Pin<Box<dyn std::future::Future<Output = Result<String, DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let id = format!("fake-{}", spec.name);
            self.containers.lock().unwrap().insert(
                id.clone(),
                FakeContainer {
                    spec,
                    running: false,
                    env_overrides: HashMap::new(),
                    archives: HashMap::new(),
                },
            );
            Ok(id)
        })
    }

    fn connect_to_network<'a>(&'a self, _network: &'a str, _container: &'a str, _ipv4: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move { Ok(()) })
    }

    fn start_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let mut containers = self.containers.lock().unwrap();
            let c = containers.get_mut(id).ok_or_else(|| DockerHostError::ContainerNotFound(id.to_string()))?;
            c.running = true;
            Ok(())
        })
    }

    fn stop_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let mut containers = self.containers.lock().unwrap();
            let c = containers.get_mut(id).ok_or_else(|| DockerHostError::ContainerNotFound(id.to_string()))?;
            c.running = false;
            Ok(())
        })
    }

    fn restart_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let mut containers = self.containers.lock().unwrap();
            let c = containers.get_mut(id).ok_or_else(|| DockerHostError::ContainerNotFound(id.to_string()))?;
            c.running = true;
            Ok(())
        })
    }

    fn remove_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            self.containers.lock().unwrap().remove(id);
            Ok(())
        })
    }

    fn inspect_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<bollard::models::ContainerInspectResponse, DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let containers = self.containers.lock().unwrap();
            containers
                .get(id)
                .map(|_| bollard::models::ContainerInspectResponse::default())
                .ok_or_else(|| DockerHostError::ContainerNotFound(id.to_string()))
        })
    }

    fn exec<'a>(&'a self, container_id: &'a str, cmd: Vec<String>) -> Pin<Box<dyn std::future::Future<Output = Result<ExecResult, DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let mut containers = self.containers.lock().unwrap();
            let c = containers
                .get_mut(container_id)
                .ok_or_else(|| DockerHostError::ContainerNotFound(container_id.to_string()))?;
            // The image helper is invoked as `set-config KEY VALUE`; record it
            // so tests can assert on the resulting environment.
            if cmd.first().map(String::as_str) == Some("set-config") {
                if let [_, key, value] = cmd.as_slice() {
                    c.env_overrides.insert(key.clone(), value.clone());
                }
            }
            let exit_code = *self.next_exec_exit_code.lock().unwrap();
            Ok(ExecResult { exit_code, stdout: String::new() })
        })
    }

    fn put_archive<'a>(&'a self, container_id: &'a str, dest: &'a str, tar_bytes: Vec<u8>) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let mut containers = self.containers.lock().unwrap();
            let c = containers
                .get_mut(container_id)
                .ok_or_else(|| DockerHostError::ContainerNotFound(container_id.to_string()))?;
            c.archives.insert(dest.to_string(), tar_bytes);
            Ok(())
        })
    }

    fn get_archive<'a>(&'a self, container_id: &'a str, path: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<u8>, DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let containers = self.containers.lock().unwrap();
            let c = containers
                .get(container_id)
                .ok_or_else(|| DockerHostError::ContainerNotFound(container_id.to_string()))?;
            c.archives
                .get(path)
                .cloned()
                .ok_or_else(|| DockerHostError::ContainerNotFound(format!("{container_id}:{path}")))
        })
    }
}

/// A `HostPool` over a fixed set of fake hosts, addressed the same way
/// `HostClientPool` addresses live ones, for exercising the lifecycle
/// engine without a live Docker daemon (§8).
#[derive(Default)]
pub struct FakeHostPool {
    hosts: HashMap<String, Arc<FakeDockerHost>>,
}

impl FakeHostPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, addr: impl Into<String>, host: Arc<FakeDockerHost>) -> Self {
        self.hosts.insert(addr.into(), host);
        self
    }

    pub fn host(&self, addr: &str) -> Option<Arc<FakeDockerHost>> {
        self.hosts.get(addr).cloned()
    }
}

impl HostPool for FakeHostPool {
    fn get_ops(&self, host_addr: &str) -> Result<Arc<dyn DockerHostOps>, DockerHostError> {
        self.hosts
            .get(host_addr)
            .cloned()
            .map(|h| h as Arc<dyn DockerHostOps>)
            .ok_or_else(|| DockerHostError::ConnectionFailed(format!("no fake host registered for {host_addr}")))
    }
}
