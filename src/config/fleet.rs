//! TOML fleet file: orchestrator settings and tenant profiles.
//!
//! ```toml
//! default_tenant = "Acme Corp"
//!
//! [settings]
//! max_warm = 2
//! health_timeout_secs = 45
//!
//! [settings.ports.grafana]
//! start = 4100
//! internal = 8888
//!
//! [settings.images]
//! genesys = "registry.local/genesys-mcp:1.4"
//!
//! [[tenants]]
//! name = "Acme Corp"
//! description = "Primary on-call tenant"
//!
//! [[tenants.sidecars]]
//! kind = "grafana"
//! env = { GRAFANA_URL = "https://grafana.acme.example" }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sidecar::config::{PortRange, SidecarKind, SidecarRequest};

/// Top-level fleet file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetFile {
    #[serde(default)]
    pub settings: SettingsFile,
    #[serde(default)]
    pub tenants: Vec<TenantProfile>,
    /// Tenant started by `up` when none is named. Defaults to the first.
    pub default_tenant: Option<String>,
}

/// `[settings]` table. Every field is optional and overrides the default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub max_warm: Option<usize>,
    pub network_name: Option<String>,
    pub health_timeout_secs: Option<u64>,
    pub health_interval_secs: Option<u64>,
    pub startup_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub port_window: Option<u16>,
    pub stop_grace_secs: Option<u64>,
    /// Keyed by sidecar kind name.
    #[serde(default)]
    pub ports: BTreeMap<String, PortRange>,
    /// Keyed by sidecar kind name.
    #[serde(default)]
    pub images: BTreeMap<String, String>,
}

/// A tenant and the sidecars it runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TenantProfile {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub sidecars: Vec<SidecarRequest>,
}

impl FleetFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    /// Parse `raw`; `path` is only used in error messages.
    pub fn parse(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl SettingsFile {
    pub(crate) fn port_overrides(&self) -> Result<BTreeMap<SidecarKind, PortRange>, ConfigError> {
        self.ports
            .iter()
            .map(|(name, range)| Ok((kind_key("settings.ports", name)?, *range)))
            .collect()
    }

    pub(crate) fn image_overrides(&self) -> Result<BTreeMap<SidecarKind, String>, ConfigError> {
        self.images
            .iter()
            .map(|(name, image)| Ok((kind_key("settings.images", name)?, image.clone())))
            .collect()
    }
}

fn kind_key(table: &str, name: &str) -> Result<SidecarKind, ConfigError> {
    name.parse().map_err(|e: crate::sidecar::error::UnknownSidecarKind| {
        ConfigError::InvalidValue {
            key: format!("{table}.{name}"),
            message: e.to_string(),
        }
    })
}
