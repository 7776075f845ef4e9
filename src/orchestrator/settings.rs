//! Orchestrator policy settings.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::sidecar::config::{PortRange, SidecarKind};
use crate::sidecar::error::OrchestratorError;

/// Policy for starting, probing and retiring tenant containers.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Maximum number of tenants kept warm.
    pub max_warm: usize,
    /// Docker network every sidecar joins.
    pub network_name: String,
    /// How long to wait for a container to become healthy.
    pub health_timeout: Duration,
    /// Interval between health check polls.
    pub health_interval: Duration,
    /// Upper bound for adopting/pulling/creating one container.
    pub startup_timeout: Duration,
    /// Tenants idle for longer are retired by `evict_idle`. Zero disables.
    pub idle_timeout: Duration,
    /// Grace period passed to the runtime when stopping a container.
    pub stop_grace: Duration,
    /// Number of host ports scanned from each kind's range start.
    pub port_window: u16,
    /// Per-kind overrides of [`SidecarKind::default_ports`].
    pub port_ranges: BTreeMap<SidecarKind, PortRange>,
    /// Per-kind overrides of [`SidecarKind::default_image`].
    pub images: BTreeMap<SidecarKind, String>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_warm: 3,
            network_name: "mcpfleet-network".to_string(),
            health_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(2),
            startup_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(1800), // 30 minutes
            stop_grace: Duration::from_secs(10),
            port_window: 100,
            port_ranges: BTreeMap::new(),
            images: BTreeMap::new(),
        }
    }
}

impl OrchestratorSettings {
    pub fn port_range(&self, kind: SidecarKind) -> PortRange {
        self.port_ranges
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_ports())
    }

    pub fn image(&self, kind: SidecarKind) -> &str {
        self.images
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_image())
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let invalid = |reason: &str| {
            Err(OrchestratorError::Config {
                reason: reason.to_string(),
            })
        };
        if self.max_warm == 0 {
            return invalid("max_warm must be at least 1");
        }
        if self.network_name.trim().is_empty() {
            return invalid("network_name must not be empty");
        }
        if self.health_interval.is_zero() {
            return invalid("health_interval must be greater than zero");
        }
        if self.startup_timeout.is_zero() {
            return invalid("startup_timeout must be greater than zero");
        }
        if self.port_window == 0 {
            return invalid("port_window must be at least 1");
        }
        Ok(())
    }
}
