//! mcpfleet: per-tenant MCP server sidecars on Docker.
//!
//! Tenants ask for a set of MCP servers (Grafana, AlertManager, Genesys). The
//! [`Orchestrator`] allocates host ports, starts the containers, waits for
//! their endpoints to answer, and keeps at most `max_warm` tenants resident,
//! retiring the least recently used one when a new tenant arrives.
//!
//! - [`sidecar`]: per-container types, the runtime seam, Docker, health probes
//! - [`orchestrator`]: port ledger, warm pool and the facade
//! - [`config`]: fleet file and `MCPFLEET_*` environment resolution
//! - [`testing`]: in-memory runtime and scripted probe

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod sidecar;
pub mod testing;

pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use sidecar::{
    ContainerRuntimeStatus, ContainerState, SidecarKind, SidecarRequest, TenantContainerSet,
};
