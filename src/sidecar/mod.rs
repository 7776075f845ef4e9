//! Per-container building blocks for tenant MCP sidecars.
//!
//! Everything here deals with one container at a time. Composition across a
//! tenant's containers and across tenants lives in [`crate::orchestrator`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                           LifecycleDriver                                  │
//! │                                                                            │
//! │   start(spec)                                                              │
//! │         │                                                                  │
//! │         ▼                                                                  │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Adopt / drop │────▶│ Network +    │────▶│ Create & Start Container │  │
//! │   │ same name    │     │ Pull Image   │     │ (labels, port, restart)  │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                                                        │                   │
//! │                                                        ▼                   │
//! │                                              ┌──────────────────────────┐  │
//! │                                              │ wait_healthy (HTTP GET)  │  │
//! │                                              └──────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The driver talks to a [`ContainerRuntime`]; [`DockerRuntime`] is the
//! production implementation.

pub mod config;
pub mod docker;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod runtime;
pub mod status;

pub use config::{
    ContainerIdentity, ContainerSpec, PortRange, SidecarKind, SidecarRequest, managed_label_filter,
};
pub use docker::{DockerRuntime, connect_docker};
pub use error::{
    AllocationError, HealthTimeoutError, OrchestratorError, ProbeError, Result, RuntimeError,
    StopError, UnknownSidecarKind,
};
pub use health::{HealthProbe, HttpHealthProbe, wait_healthy};
pub use lifecycle::LifecycleDriver;
pub use runtime::{ContainerHandle, ContainerRuntime, RunRequest};
pub use status::{ContainerRuntimeStatus, ContainerState, TenantContainerSet};
