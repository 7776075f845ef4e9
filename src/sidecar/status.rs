//! Observed state of tenant sidecar containers.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sidecar::config::{ContainerSpec, SidecarKind};

/// Container lifecycle states.
///
/// `NotFound → Starting → Running → {Healthy | Unhealthy}`, any state may move
/// to `Error`, and live states go through `Stopping` to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    NotFound,
    Starting,
    Running,
    Healthy,
    Unhealthy,
    Stopping,
    Stopped,
    Error,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }

    /// A container process exists and has not been asked to stop.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Running | Self::Healthy | Self::Unhealthy)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of one managed container.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerRuntimeStatus {
    pub spec: ContainerSpec,
    pub state: ContainerState,
    /// Runtime-assigned id, present once the container exists.
    pub container_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub healthy_at: Option<DateTime<Utc>>,
    pub last_accessed: DateTime<Utc>,
    /// Present only in `Error` and `Unhealthy`.
    pub error: Option<String>,
}

impl ContainerRuntimeStatus {
    pub fn new(spec: ContainerSpec) -> Self {
        Self {
            spec,
            state: ContainerState::NotFound,
            container_id: None,
            started_at: None,
            healthy_at: None,
            last_accessed: Utc::now(),
            error: None,
        }
    }

    /// A status that never got past building its spec.
    pub fn failed(spec: ContainerSpec, reason: impl Into<String>) -> Self {
        let mut status = Self::new(spec);
        status.mark_error(reason);
        status
    }

    pub fn kind(&self) -> SidecarKind {
        self.spec.kind()
    }

    pub fn container_name(&self) -> String {
        self.spec.container_name()
    }

    pub fn url(&self) -> String {
        self.spec.url()
    }

    pub fn mark_running(&mut self, container_id: String) {
        self.state = ContainerState::Running;
        self.container_id = Some(container_id);
        self.started_at = Some(Utc::now());
        self.error = None;
    }

    pub fn mark_healthy(&mut self) {
        self.state = ContainerState::Healthy;
        self.healthy_at = Some(Utc::now());
        self.error = None;
    }

    pub fn mark_unhealthy(&mut self, reason: impl Into<String>) {
        self.state = ContainerState::Unhealthy;
        self.error = Some(reason.into());
    }

    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.state = ContainerState::Error;
        self.error = Some(reason.into());
    }

    pub fn mark_stopped(&mut self) {
        self.state = ContainerState::Stopped;
        self.error = None;
    }

    /// Time since the container started; zero if it never did.
    pub fn uptime(&self) -> Duration {
        self.started_at
            .and_then(|t| (Utc::now() - t).to_std().ok())
            .unwrap_or_default()
    }
}

/// All containers of one tenant.
#[derive(Debug, Clone, Serialize)]
pub struct TenantContainerSet {
    pub tenant: String,
    pub containers: BTreeMap<SidecarKind, ContainerRuntimeStatus>,
    pub last_accessed: DateTime<Utc>,
}

impl TenantContainerSet {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            containers: BTreeMap::new(),
            last_accessed: Utc::now(),
        }
    }

    pub fn insert(&mut self, status: ContainerRuntimeStatus) {
        self.containers.insert(status.kind(), status);
    }

    pub fn get(&self, kind: SidecarKind) -> Option<&ContainerRuntimeStatus> {
        self.containers.get(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Refresh the access time of the set and every member.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.last_accessed = now;
        for status in self.containers.values_mut() {
            status.last_accessed = now;
        }
    }

    /// True when every member is healthy. Vacuously true for an empty set.
    pub fn all_healthy(&self) -> bool {
        self.containers
            .values()
            .all(|s| s.state == ContainerState::Healthy)
    }

    /// True when every member has a live container process.
    pub fn all_live(&self) -> bool {
        self.containers.values().all(|s| s.state.is_live())
    }

    pub fn states(&self) -> BTreeMap<SidecarKind, ContainerState> {
        self.containers
            .iter()
            .map(|(kind, status)| (*kind, status.state))
            .collect()
    }

    pub fn container_ids(&self) -> impl Iterator<Item = &str> {
        self.containers
            .values()
            .filter_map(|s| s.container_id.as_deref())
    }

    /// No two members with an assigned port share it.
    pub fn has_unique_host_ports(&self) -> bool {
        let mut seen = HashSet::new();
        self.containers
            .values()
            .filter(|s| s.spec.host_port != 0)
            .all(|s| seen.insert(s.spec.host_port))
    }

    /// URLs of healthy members.
    pub fn healthy_urls(&self) -> BTreeMap<SidecarKind, String> {
        self.containers
            .iter()
            .filter(|(_, s)| s.state == ContainerState::Healthy)
            .map(|(kind, s)| (*kind, s.url()))
            .collect()
    }
}
