use std::collections::HashMap;
use std::pin::Pin;

use bollard::Docker;
use futures::stream::StreamExt;

use crate::config::TlsConfig;
use crate::error::DockerHostError;

use super::{CreateContainerSpec, DockerHostOps, ExecResult, SystemInfoView};

/// One connected client per remote host address, built the way
/// `DockerClient::new` builds a client over a local socket
/// (`crates/agent/src/docker/client.rs`) except the transport is TLS to a
/// `host:port` instead of a unix socket.
#[derive(Debug, Clone)]
pub struct DockerHostClient {
    client: Docker,
    host_addr: String,
}

impl DockerHostClient {
    pub fn connect(host_addr: &str, tls: &TlsConfig) -> Result<Self, DockerHostError> {
        let client = Docker::connect_with_ssl(
            host_addr,
            std::path::Path::new(&tls.key_path),
            std::path::Path::new(&tls.cert_path),
            std::path::Path::new(&tls.ca_path),
            120,
            &bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| DockerHostError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            host_addr: host_addr.to_string(),
        })
    }

    fn map_404(id: &str, e: bollard::errors::Error) -> DockerHostError {
        match e {
            bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
                DockerHostError::ContainerNotFound(id.to_string())
            }
            other => DockerHostError::Bollard(other),
        }
    }
}

impl DockerHostOps for DockerHostClient {
    fn list_containers(&self) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<bollard::models::ContainerSummary>, DockerHostError>> + Send + '_>> {
        Box::pin(async move {
            use bollard::query_parameters::ListContainersOptions;
            let options = Some(ListContainersOptions { all: true, ..Default::default() });
            self.client.list_containers(options).await.map_err(DockerHostError::from)
        })
    }

    fn info(&self) -> Pin<Box<dyn std::future::Future<Output = Result<SystemInfoView, DockerHostError>> + Send + '_>> {
        Box::pin(async move {
            let info = self.client.info().await?;
            let cpus = info.ncpu.unwrap_or(0).max(0) as u32;
            let memory_gib = info.mem_total.unwrap_or(0) as f64 / (1024.0 * 1024.0 * 1024.0);
            Ok(SystemInfoView { cpus, memory_gib })
        })
    }

    fn list_networks(&self) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<bollard::models::Network>, DockerHostError>> + Send + '_>> {
        Box::pin(async move {
            self.client
                .list_networks(None::<bollard::query_parameters::ListNetworksOptions>)
                .await
                .map_err(DockerHostError::from)
        })
    }

    fn create_network<'a>(&'a self, name: &'a str, subnet: Option<&'a str>) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            use bollard::models::{Ipam, IpamConfig, NetworkCreateRequest};
            let ipam = subnet.map(|s| Ipam {
                config: Some(vec![IpamConfig { subnet: Some(s.to_string()), ..Default::default() }]),
                ..Default::default()
            });
            let config = NetworkCreateRequest {
                name: name.to_string(),
                driver: Some("bridge".to_string()),
                ipam,
                ..Default::default()
            };
            self.client.create_network(config).await?;
            Ok(())
        })
    }

    fn ensure_network<'a>(&'a self, name: &'a str, subnet: Option<&'a str>) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            let networks = DockerHostOps::list_networks(self).await?;
            if networks.iter().any(|n| n.name.as_deref() == Some(name)) {
                return Ok(());
            }
            DockerHostOps::create_network(self, name, subnet).await
        })
    }

    fn ensure_image<'a>(&'a self, image: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            if self.client.inspect_image(image).await.is_ok() {
                return Ok(());
            }
            use bollard::query_parameters::CreateImageOptions;
            let options = Some(CreateImageOptions { from_image: Some(image.to_string()), ..Default::default() });
            let mut stream = self.client.create_image(options, None, None);
            while let Some(result) = stream.next().await {
                result?;
            }
            Ok(())
        })
    }

    fn create_container<'a>(&'a self, spec: CreateContainerSpec) -> Pin<Box<dyn std::future::Future<Output = Result<String, DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            use bollard::models::{ContainerCreateBody, EndpointSettings, EndpointsConfig, HostConfig, NetworkingConfig, RestartPolicy, RestartPolicyNameEnum};

            let mut endpoints: EndpointsConfig = HashMap::new();
            endpoints.insert(
                spec.network.clone(),
                EndpointSettings {
                    ipam_config: Some(Box::new(bollard::models::EndpointIpamConfig {
                        ipv4_address: Some(spec.ipv4.clone()),
                        ..Default::default()
                    })),
                    ..Default::default()
                },
            );

            let host_config = HostConfig {
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    maximum_retry_count: Some(0),
                }),
                binds: if spec.binds.is_empty() { None } else { Some(spec.binds.clone()) },
                ..Default::default()
            };

            let body = ContainerCreateBody {
                image: Some(spec.image.clone()),
                labels: Some(spec.labels.clone()),
                env: Some(spec.env.clone()),
                host_config: Some(host_config),
                networking_config: Some(NetworkingConfig { endpoints_config: Some(endpoints) }),
                ..Default::default()
            };

            use bollard::query_parameters::CreateContainerOptions;
            let options = Some(CreateContainerOptions { name: Some(spec.name.clone()), ..Default::default() });
            let result = self.client.create_container(options, body).await?;
            Ok(result.id)
        })
    }

    fn connect_to_network<'a>(&'a self, network: &'a str, container: &'a str, ipv4: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            use bollard::models::{EndpointIpamConfig, EndpointSettings, NetworkConnectRequest};
            let config = NetworkConnectRequest {
                container: container.to_string(),
                endpoint_config: Some(EndpointSettings {
                    ipam_config: Some(Box::new(EndpointIpamConfig { ipv4_address: Some(ipv4.to_string()), ..Default::default() })),
                    ..Default::default()
                }),
            };
            self.client.connect_network(network, config).await?;
            Ok(())
        })
    }

    fn start_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            self.client
                .start_container(id, None)
                .await
                .map_err(|e| Self::map_404(id, e))
        })
    }

    fn stop_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            self.client
                .stop_container(id, None::<bollard::query_parameters::StopContainerOptions>)
                .await
                .map_err(|e| Self::map_404(id, e))
        })
    }

    fn restart_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            self.client
                .restart_container(id, None::<bollard::query_parameters::RestartContainerOptions>)
                .await
                .map_err(|e| Self::map_404(id, e))
        })
    }

    fn remove_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            use bollard::query_parameters::RemoveContainerOptions;
            let options = Some(RemoveContainerOptions { force: true, ..Default::default() });
            match self.client.remove_container(id, options).await {
                Ok(()) => Ok(()),
                Err(bollard::errors::Error::DockerResponseServerError { status_code: 404, .. }) => Ok(()),
                Err(other) => Err(DockerHostError::Bollard(other)),
            }
        })
    }

    fn inspect_container<'a>(&'a self, id: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<bollard::models::ContainerInspectResponse, DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            self.client
                .inspect_container(id, None)
                .await
                .map_err(|e| Self::map_404(id, e))
        })
    }

    fn exec<'a>(&'a self, container_id: &'a str, cmd: Vec<String>) -> Pin<Box<dyn std::future::Future<Output = Result<ExecResult, DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            use bollard::exec::StartExecResults;
            use bollard::models::ExecConfig;

            let config = ExecConfig {
                attach_stdin: Some(false),
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                cmd: Some(cmd),
                ..Default::default()
            };
            let created = self
                .client
                .create_exec(container_id, config)
                .await
                .map_err(|e| Self::map_404(container_id, e))?;

            let mut stdout = String::new();
            if let StartExecResults::Attached { mut output, .. } = self.client.start_exec(&created.id, None).await? {
                while let Some(chunk) = output.next().await {
                    if let Ok(bollard::container::LogOutput::StdOut { message } | bollard::container::LogOutput::StdErr { message }) = chunk {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                }
            }

            let inspected = self.client.inspect_exec(&created.id).await?;
            Ok(ExecResult { exit_code: inspected.exit_code.unwrap_or(-1), stdout })
        })
    }

    fn put_archive<'a>(&'a self, container_id: &'a str, dest: &'a str, tar_bytes: Vec<u8>) -> Pin<Box<dyn std::future::Future<Output = Result<(), DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            use bollard::query_parameters::UploadToContainerOptions;
            let options = UploadToContainerOptions { path: dest.to_string(), ..Default::default() };
            self.client
                .upload_to_container(container_id, Some(options), tar_bytes.into())
                .await
                .map_err(|e| Self::map_404(container_id, e))
        })
    }

    fn get_archive<'a>(&'a self, container_id: &'a str, path: &'a str) -> Pin<Box<dyn std::future::Future<Output = Result<Vec<u8>, DockerHostError>> + Send + 'a>> {
        Box::pin(async move {
            use bollard::query_parameters::DownloadFromContainerOptions;
            let options = Some(DownloadFromContainerOptions { path: path.to_string() });
            let mut stream = self.client.download_from_container(container_id, options);
            let mut buf = Vec::new();
            while let Some(chunk) = stream.next().await {
                let bytes = chunk.map_err(|e| Self::map_404(container_id, e))?;
                buf.extend_from_slice(&bytes);
            }
            Ok(buf)
        })
    }
}

impl std::fmt::Display for DockerHostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.host_addr)
    }
}
