//! Configuration loading.
//!
//! Precedence: built-in defaults, then the TOML fleet file, then `MCPFLEET_*`
//! environment variables.

mod fleet;
mod helpers;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use fleet::{FleetFile, SettingsFile, TenantProfile};
pub use helpers::{EnvLookup, process_env};

#[cfg(test)]
pub(crate) use helpers::no_env;

use crate::config::helpers::{optional_env, parse_optional_env};
use crate::error::ConfigError;
use crate::orchestrator::OrchestratorSettings;

/// Resolved configuration for the `mcpfleet` binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub orchestrator: OrchestratorSettings,
    pub tenants: Vec<TenantProfile>,
    pub default_tenant: Option<String>,
    /// File the configuration was read from, if any.
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load from `path` (or the default location if it exists) and the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with(path, &process_env)
    }

    /// As [`Config::load`], reading environment values from `lookup`.
    pub fn load_with(path: Option<&Path>, lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| default_config_path().filter(|p| p.exists()));

        let file = match &path {
            Some(p) => FleetFile::load(p)?,
            None => FleetFile::default(),
        };

        let mut config = Self::resolve_with(file, lookup)?;
        config.source = path;
        Ok(config)
    }

    /// Merge `file` with environment values from `lookup`.
    pub fn resolve_with(file: FleetFile, lookup: EnvLookup<'_>) -> Result<Self, ConfigError> {
        let defaults = OrchestratorSettings::default();
        let s = &file.settings;

        let secs = |key: &str, from_file: Option<u64>, default: Duration| {
            parse_optional_env(lookup, key, from_file.unwrap_or(default.as_secs()))
                .map(Duration::from_secs)
        };

        let orchestrator = OrchestratorSettings {
            max_warm: parse_optional_env(
                lookup,
                "MCPFLEET_MAX_WARM",
                s.max_warm.unwrap_or(defaults.max_warm),
            )?,
            network_name: optional_env(lookup, "MCPFLEET_NETWORK")?
                .or_else(|| s.network_name.clone())
                .unwrap_or(defaults.network_name),
            health_timeout: secs(
                "MCPFLEET_HEALTH_TIMEOUT_SECS",
                s.health_timeout_secs,
                defaults.health_timeout,
            )?,
            health_interval: secs(
                "MCPFLEET_HEALTH_INTERVAL_SECS",
                s.health_interval_secs,
                defaults.health_interval,
            )?,
            startup_timeout: secs(
                "MCPFLEET_STARTUP_TIMEOUT_SECS",
                s.startup_timeout_secs,
                defaults.startup_timeout,
            )?,
            idle_timeout: secs(
                "MCPFLEET_IDLE_TIMEOUT_SECS",
                s.idle_timeout_secs,
                defaults.idle_timeout,
            )?,
            stop_grace: secs(
                "MCPFLEET_STOP_GRACE_SECS",
                s.stop_grace_secs,
                defaults.stop_grace,
            )?,
            port_window: parse_optional_env(
                lookup,
                "MCPFLEET_PORT_WINDOW",
                s.port_window.unwrap_or(defaults.port_window),
            )?,
            port_ranges: s.port_overrides()?,
            images: s.image_overrides()?,
        };

        orchestrator
            .validate()
            .map_err(|e| ConfigError::InvalidValue {
                key: "settings".to_string(),
                message: e.to_string(),
            })?;

        let mut seen = HashSet::new();
        for tenant in &file.tenants {
            if !seen.insert(tenant.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "tenants".to_string(),
                    message: format!("duplicate tenant '{}'", tenant.name),
                });
            }
        }

        if let Some(name) = &file.default_tenant
            && !seen.contains(name.as_str())
        {
            return Err(ConfigError::InvalidValue {
                key: "default_tenant".to_string(),
                message: format!("no tenant named '{name}'"),
            });
        }

        Ok(Self {
            orchestrator,
            tenants: file.tenants,
            default_tenant: file.default_tenant,
            source: None,
        })
    }

    pub fn tenant(&self, name: &str) -> Option<&TenantProfile> {
        self.tenants.iter().find(|t| t.name == name)
    }

    /// The configured default tenant, else the first one.
    pub fn default_tenant(&self) -> Option<&TenantProfile> {
        match &self.default_tenant {
            Some(name) => self.tenant(name),
            None => self.tenants.first(),
        }
    }
}

/// `~/.config/mcpfleet/config.toml` (platform equivalent).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mcpfleet").join("config.toml"))
}
