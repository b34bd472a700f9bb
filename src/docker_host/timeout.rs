//! Bounds every per-host RPC to a fixed duration (spec.md §5: "individual
//! container-engine calls have a bounded per-call timeout … default 30 s").
//! Wraps whatever `DockerHostOps` the pool handed out — live or fake — the
//! same way a retry/backoff decorator would sit in front of a teacher
//! client without the lifecycle code above it knowing the difference.

use std::sync::Arc;
use std::time::Duration;

use crate::error::DockerHostError;

use super::{BoxFut, CreateContainerSpec, DockerHostOps, ExecResult, SystemInfoView};

pub struct TimeoutDockerHost {
    inner: Arc<dyn DockerHostOps>,
    timeout: Duration,
}

impl TimeoutDockerHost {
    pub fn new(inner: Arc<dyn DockerHostOps>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bound<T>(&self, fut: impl std::future::Future<Output = Result<T, DockerHostError>> + Send) -> Result<T, DockerHostError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DockerHostError::Timeout(self.timeout)),
        }
    }
}

impl DockerHostOps for TimeoutDockerHost {
    fn list_containers(&self) -> BoxFut<'_, Vec<bollard::models::ContainerSummary>> {
        Box::pin(self.bound(self.inner.list_containers()))
    }

    fn info(&self) -> BoxFut<'_, SystemInfoView> {
        Box::pin(self.bound(self.inner.info()))
    }

    fn list_networks(&self) -> BoxFut<'_, Vec<bollard::models::Network>> {
        Box::pin(self.bound(self.inner.list_networks()))
    }

    fn create_network<'a>(&'a self, name: &'a str, subnet: Option<&'a str>) -> BoxFut<'a, ()> {
        Box::pin(self.bound(self.inner.create_network(name, subnet)))
    }

    fn ensure_network<'a>(&'a self, name: &'a str, subnet: Option<&'a str>) -> BoxFut<'a, ()> {
        Box::pin(self.bound(self.inner.ensure_network(name, subnet)))
    }

    fn ensure_image<'a>(&'a self, image: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.bound(self.inner.ensure_image(image)))
    }

    fn create_container<'a>(&'a self, spec: CreateContainerSpec) -> BoxFut<'a, String> {
        Box::pin(self.bound(self.inner.create_container(spec)))
    }

    fn connect_to_network<'a>(&'a self, network: &'a str, container: &'a str, ipv4: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.bound(self.inner.connect_to_network(network, container, ipv4)))
    }

    fn start_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.bound(self.inner.start_container(id)))
    }

    fn stop_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.bound(self.inner.stop_container(id)))
    }

    fn restart_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.bound(self.inner.restart_container(id)))
    }

    fn remove_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, ()> {
        Box::pin(self.bound(self.inner.remove_container(id)))
    }

    fn inspect_container<'a>(&'a self, id: &'a str) -> BoxFut<'a, bollard::models::ContainerInspectResponse> {
        Box::pin(self.bound(self.inner.inspect_container(id)))
    }

    fn exec<'a>(&'a self, container_id: &'a str, cmd: Vec<String>) -> BoxFut<'a, ExecResult> {
        Box::pin(self.bound(self.inner.exec(container_id, cmd)))
    }

    fn put_archive<'a>(&'a self, container_id: &'a str, dest: &'a str, tar_bytes: Vec<u8>) -> BoxFut<'a, ()> {
        Box::pin(self.bound(self.inner.put_archive(container_id, dest, tar_bytes)))
    }

    fn get_archive<'a>(&'a self, container_id: &'a str, path: &'a str) -> BoxFut<'a, Vec<u8>> {
        Box::pin(self.bound(self.inner.get_archive(container_id, path)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::docker_host::fake::FakeDockerHost;
    use crate::docker_host::DockerHostOps;

    use super::TimeoutDockerHost;

    #[tokio::test]
    async fn calls_that_finish_within_the_bound_pass_through() {
        let inner = Arc::new(FakeDockerHost::new());
        let wrapped = TimeoutDockerHost::new(inner, Duration::from_secs(5));
        assert!(wrapped.list_containers().await.is_ok());
    }
}
