//! Error types for sidecar orchestration.

use std::time::Duration;

use thiserror::Error;

use crate::sidecar::config::SidecarKind;

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors returned by a container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime could not be reached.
    #[error("Docker not available: {reason}")]
    Unavailable {
        /// Reason why Docker is unavailable.
        reason: String,
    },

    /// The referenced container, image or network does not exist.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up.
        what: String,
    },

    /// Failed to pull the image.
    #[error("Failed to pull image '{image}': {reason}")]
    ImagePullFailed {
        /// Image name.
        image: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to create the container.
    #[error("Failed to create container '{name}': {reason}")]
    ContainerCreationFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to start the container.
    #[error("Failed to start container '{name}': {reason}")]
    ContainerStartFailed {
        /// Container name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to inspect or create the shared network.
    #[error("Failed to ensure network '{name}': {reason}")]
    NetworkFailed {
        /// Network name.
        name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Any other API failure.
    #[error("Docker {operation} failed: {reason}")]
    Api {
        /// Operation that failed.
        operation: &'static str,
        /// Reason for failure.
        reason: String,
    },
}

impl RuntimeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// No free host port left in a kind's window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No available ports for {kind} in {start}..{start}+{window}")]
pub struct AllocationError {
    pub kind: SidecarKind,
    pub start: u16,
    pub window: u16,
}

/// The health endpoint never answered in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("health check timed out after {}s", .timeout.as_secs())]
pub struct HealthTimeoutError {
    pub timeout: Duration,
}

/// A single health probe could not complete.
#[derive(Debug, Error)]
#[error("health probe failed: {0}")]
pub struct ProbeError(pub String);

/// Stopping or removing a container failed.
#[derive(Debug, Error)]
#[error("Failed to stop container '{name}': {source}")]
pub struct StopError {
    pub name: String,
    #[source]
    pub source: RuntimeError,
}

/// Unrecognized sidecar kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown sidecar kind '{0}'")]
pub struct UnknownSidecarKind(pub String);

/// Errors surfaced by the orchestrator itself.
///
/// Per-sidecar failures during a start are captured into that sidecar's
/// status instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("Orchestrator configuration error: {reason}")]
    Config {
        /// Reason for error.
        reason: String,
    },
}
