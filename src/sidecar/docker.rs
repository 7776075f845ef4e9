//! [`ContainerRuntime`] over the Docker Engine API.

use std::collections::HashMap;
#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, HostConfig, PortBinding, RestartPolicyNameEnum};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::sidecar::config::ENDPOINT_HOST;
use crate::sidecar::error::RuntimeError;
use crate::sidecar::runtime::{ContainerHandle, ContainerRuntime, RunRequest};

/// Connect to the Docker daemon.
///
/// Tries bollard's local defaults (honouring `DOCKER_HOST`) first, then the
/// Docker Desktop and rootless sockets.
pub async fn connect_docker() -> Result<Docker, RuntimeError> {
    #[cfg_attr(not(unix), allow(unused_mut))]
    let mut last_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    #[cfg(unix)]
    for socket in fallback_sockets() {
        if !socket.exists() {
            continue;
        }
        let path = socket.to_string_lossy();
        match Docker::connect_with_unix(&path, 120, bollard::API_DEFAULT_VERSION) {
            Ok(docker) => match docker.ping().await {
                Ok(_) => {
                    tracing::debug!("Connected to Docker via {}", path);
                    return Ok(docker);
                }
                Err(e) => last_error = e.to_string(),
            },
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(RuntimeError::Unavailable { reason: last_error })
}

#[cfg(unix)]
fn fallback_sockets() -> Vec<PathBuf> {
    let mut sockets = Vec::new();
    if let Some(home) = dirs::home_dir() {
        sockets.push(home.join(".docker").join("run").join("docker.sock"));
    }
    if let Some(runtime_dir) = dirs::runtime_dir() {
        sockets.push(runtime_dir.join("docker.sock"));
    }
    sockets
}

fn is_status(err: &DockerError, code: u16) -> bool {
    matches!(
        err,
        DockerError::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

fn api_error(operation: &'static str, err: DockerError) -> RuntimeError {
    RuntimeError::Api {
        operation,
        reason: err.to_string(),
    }
}

/// A container handle from an inspect response. An addressable container
/// always has an id.
fn inspect_handle(
    name: &str,
    info: ContainerInspectResponse,
) -> Result<ContainerHandle, RuntimeError> {
    let id = info
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RuntimeError::Api {
            operation: "inspect container",
            reason: format!("no id reported for {name}"),
        })?;

    Ok(ContainerHandle {
        id,
        name: info
            .name
            .map(|n| n.trim_start_matches('/').to_string())
            .unwrap_or_else(|| name.to_string()),
        running: info.state.and_then(|s| s.running).unwrap_or(false),
        labels: info
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default()
            .into_iter()
            .collect(),
    })
}

/// Docker-backed container runtime with a lazily established connection.
pub struct DockerRuntime {
    docker: RwLock<Option<Docker>>,
}

impl DockerRuntime {
    /// Create a runtime that connects on first use.
    pub fn new() -> Self {
        Self {
            docker: RwLock::new(None),
        }
    }

    /// Get or create the Docker connection.
    async fn docker(&self) -> Result<Docker, RuntimeError> {
        {
            let guard = self.docker.read().await;
            if let Some(ref d) = *guard {
                return Ok(d.clone());
            }
        }
        let docker = connect_docker().await?;
        *self.docker.write().await = Some(docker.clone());
        Ok(docker)
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        let docker = self.docker().await?;
        docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Unavailable {
                reason: e.to_string(),
            })
    }

    async fn ensure_network(&self, name: &str) -> Result<(), RuntimeError> {
        let docker = self.docker().await?;

        match docker
            .inspect_network(name, None::<InspectNetworkOptions<String>>)
            .await
        {
            Ok(_) => return Ok(()),
            Err(e) if is_status(&e, 404) => {}
            Err(e) => {
                return Err(RuntimeError::NetworkFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        tracing::info!("Creating Docker network: {}", name);
        let options = CreateNetworkOptions {
            name: name.to_string(),
            driver: "bridge".to_string(),
            ..Default::default()
        };
        match docker.create_network(options).await {
            Ok(_) => Ok(()),
            // Lost a creation race with a concurrent start.
            Err(e) if is_status(&e, 409) => Ok(()),
            Err(e) => Err(RuntimeError::NetworkFailed {
                name: name.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        let docker = self.docker().await?;
        match docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) if is_status(&e, 404) => Ok(false),
            Err(e) => Err(api_error("inspect image", e)),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let docker = self.docker().await?;

        tracing::info!("Pulling image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        tracing::trace!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(RuntimeError::ImagePullFailed {
                        image: image.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!("Pulled image: {}", image);
        Ok(())
    }

    async fn run(&self, request: RunRequest) -> Result<String, RuntimeError> {
        let docker = self.docker().await?;

        let mut port_bindings = HashMap::new();
        let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
        for (container_port, host_port) in &request.ports {
            let key = format!("{}/tcp", container_port);
            port_bindings.insert(
                key.clone(),
                Some(vec![PortBinding {
                    host_ip: Some(ENDPOINT_HOST.to_string()),
                    host_port: Some(host_port.to_string()),
                }]),
            );
            exposed_ports.insert(key, HashMap::new());
        }

        let env: Vec<String> = request
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            network_mode: Some(request.network.clone()),
            restart_policy: Some(bollard::models::RestartPolicy {
                name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                maximum_retry_count: None,
            }),
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(request.image.clone()),
            env: if env.is_empty() { None } else { Some(env) },
            cmd: request.command.clone(),
            exposed_ports: Some(exposed_ports),
            labels: Some(request.labels.clone().into_iter().collect()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: request.name.clone(),
            ..Default::default()
        };

        let response = docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::ContainerCreationFailed {
                name: request.name.clone(),
                reason: e.to_string(),
            })?;

        if let Err(e) = docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
        {
            // Do not leave a created-but-dead container holding the name.
            let _ = docker
                .remove_container(
                    &response.id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
            return Err(RuntimeError::ContainerStartFailed {
                name: request.name,
                reason: e.to_string(),
            });
        }

        Ok(response.id)
    }

    async fn get(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        let docker = self.docker().await?;
        let info = match docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => info,
            Err(e) if is_status(&e, 404) => return Ok(None),
            Err(e) => return Err(api_error("inspect container", e)),
        };

        inspect_handle(name, info).map(Some)
    }

    async fn stop(&self, id: &str, grace: Duration) -> Result<(), RuntimeError> {
        let docker = self.docker().await?;
        let options = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        match docker.stop_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            // 304: already stopped
            Err(e) if is_status(&e, 304) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(RuntimeError::NotFound {
                what: format!("container {id}"),
            }),
            Err(e) => Err(api_error("stop container", e)),
        }
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        let docker = self.docker().await?;
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        match docker.remove_container(id, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_status(&e, 404) => Err(RuntimeError::NotFound {
                what: format!("container {id}"),
            }),
            Err(e) => Err(api_error("remove container", e)),
        }
    }

    async fn list(&self, label_filter: &str) -> Result<Vec<ContainerHandle>, RuntimeError> {
        let docker = self.docker().await?;
        let options = ListContainersOptions {
            all: true,
            filters: HashMap::from([("label".to_string(), vec![label_filter.to_string()])]),
            ..Default::default()
        };

        let containers = docker
            .list_containers(Some(options))
            .await
            .map_err(|e| api_error("list containers", e))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .and_then(|names| names.into_iter().next())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());
                Some(ContainerHandle {
                    id,
                    name,
                    running: c.state.as_deref() == Some("running"),
                    labels: c.labels.unwrap_or_default().into_iter().collect(),
                })
            })
            .collect())
    }
}
