//! The container runtime seam.
//!
//! [`ContainerRuntime`] is the narrow set of operations the lifecycle driver
//! needs from a container engine. [`DockerRuntime`](crate::sidecar::DockerRuntime)
//! implements it over the Docker API; tests use
//! [`FakeRuntime`](crate::testing::FakeRuntime).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::sidecar::error::RuntimeError;

/// Everything needed to create and start one container.
///
/// Containers are always created with the `unless-stopped` restart policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub command: Option<Vec<String>>,
    /// (container port, host port) pairs, TCP.
    pub ports: Vec<(u16, u16)>,
    pub network: String,
    pub labels: BTreeMap<String, String>,
}

/// A container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    /// Name without the leading `/` Docker reports.
    pub name: String,
    pub running: bool,
    pub labels: BTreeMap<String, String>,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check the runtime is reachable.
    async fn ping(&self) -> Result<(), RuntimeError>;

    /// Create the named network if it does not exist.
    async fn ensure_network(&self, name: &str) -> Result<(), RuntimeError>;

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError>;

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Create and start a container, returning its id.
    async fn run(&self, request: RunRequest) -> Result<String, RuntimeError>;

    /// Look up a container by name or id.
    async fn get(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError>;

    async fn stop(&self, id: &str, grace: Duration) -> Result<(), RuntimeError>;

    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError>;

    /// All containers, running or not, carrying the `key=value` label.
    async fn list(&self, label_filter: &str) -> Result<Vec<ContainerHandle>, RuntimeError>;
}
