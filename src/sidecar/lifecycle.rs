//! Container lifecycle driver: start and stop single sidecar containers.

use std::sync::Arc;
use std::time::Duration;

use crate::sidecar::config::ContainerSpec;
use crate::sidecar::error::{RuntimeError, StopError};
use crate::sidecar::runtime::{ContainerRuntime, RunRequest};
use crate::sidecar::status::{ContainerRuntimeStatus, ContainerState};

/// Drives one container at a time through the runtime.
///
/// Every call is a single attempt. Retrying is up to the caller.
#[derive(Clone)]
pub struct LifecycleDriver {
    runtime: Arc<dyn ContainerRuntime>,
}

impl LifecycleDriver {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Bring up the container described by `spec`.
    ///
    /// A running container with the same name is adopted instead of
    /// recreated. Errors are captured in the returned status as `Error`.
    pub async fn start(
        &self,
        spec: ContainerSpec,
        network: &str,
        startup_timeout: Duration,
    ) -> ContainerRuntimeStatus {
        let mut status = ContainerRuntimeStatus::new(spec);
        status.state = ContainerState::Starting;
        let name = status.container_name();

        match tokio::time::timeout(startup_timeout, self.start_inner(&status.spec, network)).await
        {
            Ok(Ok(id)) => {
                tracing::info!(
                    container = %name,
                    "Container running (id={})",
                    short_id(&id)
                );
                status.mark_running(id);
            }
            Ok(Err(e)) => {
                tracing::error!(container = %name, "Failed to start container: {}", e);
                status.mark_error(e.to_string());
            }
            Err(_) => {
                let reason = format!(
                    "container start timed out after {}s",
                    startup_timeout.as_secs()
                );
                tracing::error!(container = %name, "{}", reason);
                status.mark_error(reason);
            }
        }

        status
    }

    async fn start_inner(&self, spec: &ContainerSpec, network: &str) -> Result<String, RuntimeError> {
        let name = spec.container_name();

        if let Some(existing) = self.runtime.get(&name).await? {
            if existing.running {
                tracing::info!(container = %name, "Container already running, adopting it");
                return Ok(existing.id);
            }
            tracing::debug!(container = %name, "Removing stale container");
            match self.runtime.remove(&existing.id, true).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        self.runtime.ensure_network(network).await?;

        if !self.runtime.image_exists(&spec.image).await? {
            self.runtime.pull_image(&spec.image).await?;
        }

        tracing::info!(
            container = %name,
            "Starting container (image={}, port={})",
            spec.image,
            spec.host_port
        );

        self.runtime
            .run(RunRequest {
                name,
                image: spec.image.clone(),
                env: spec.env.clone(),
                command: spec.command.clone(),
                ports: vec![(spec.internal_port, spec.host_port)],
                network: network.to_string(),
                labels: spec.labels(),
            })
            .await
    }

    /// Stop and remove the container behind `status`.
    ///
    /// A container that no longer exists counts as stopped. Any other failure
    /// leaves the status in `Error` and is returned for logging.
    pub async fn stop(
        &self,
        status: &mut ContainerRuntimeStatus,
        grace: Duration,
    ) -> Result<(), StopError> {
        let Some(id) = status.container_id.clone() else {
            if status.state.is_live() {
                status.mark_stopped();
            }
            return Ok(());
        };

        let name = status.container_name();
        status.state = ContainerState::Stopping;
        tracing::info!(container = %name, "Stopping container");

        let result = match self.runtime.stop(&id, grace).await {
            Ok(()) => self.runtime.remove(&id, true).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                status.mark_stopped();
                tracing::info!(container = %name, "Container stopped and removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                status.mark_stopped();
                tracing::debug!(container = %name, "Container already gone");
                Ok(())
            }
            Err(e) => {
                status.mark_error(e.to_string());
                Err(StopError { name, source: e })
            }
        }
    }
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}
