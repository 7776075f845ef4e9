//! Desired-state types for tenant sidecar containers.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::sidecar::error::UnknownSidecarKind;

/// Prefix shared by every container name this crate creates.
pub const CONTAINER_PREFIX: &str = "mcpfleet";
/// Label marking a container as managed by this crate.
pub const LABEL_MANAGED: &str = "mcpfleet.managed";
/// Label carrying the raw tenant name.
pub const LABEL_TENANT: &str = "mcpfleet.tenant";
/// Label carrying the sidecar kind.
pub const LABEL_SIDECAR: &str = "mcpfleet.sidecar";

/// Host address that allocated ports are bound to.
pub const ENDPOINT_HOST: &str = "127.0.0.1";

/// Label filter matching every managed container.
pub fn managed_label_filter() -> String {
    format!("{LABEL_MANAGED}=true")
}

/// Supported MCP server kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SidecarKind {
    Grafana,
    Alertmanager,
    Genesys,
}

impl SidecarKind {
    pub const ALL: [SidecarKind; 3] = [
        SidecarKind::Grafana,
        SidecarKind::Alertmanager,
        SidecarKind::Genesys,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grafana => "grafana",
            Self::Alertmanager => "alertmanager",
            Self::Genesys => "genesys",
        }
    }

    /// Path of the MCP endpoint, which doubles as the health endpoint.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            Self::Grafana => "/mcp",
            Self::Alertmanager | Self::Genesys => "/sse",
        }
    }

    /// Image used when no override is configured.
    pub fn default_image(&self) -> &'static str {
        match self {
            Self::Grafana => "grafana/mcp-grafana:latest",
            Self::Alertmanager => "mcpfleet/alertmanager-mcp:latest",
            Self::Genesys => "mcpfleet/genesys-mcp:latest",
        }
    }

    /// Host port range start and container-internal port used when no override
    /// is configured.
    pub fn default_ports(&self) -> PortRange {
        match self {
            Self::Grafana => PortRange {
                start: 3100,
                internal: 8888,
            },
            Self::Alertmanager => PortRange {
                start: 9100,
                internal: 8080,
            },
            Self::Genesys => PortRange {
                start: 9200,
                internal: 8080,
            },
        }
    }

    /// Command arguments the image needs to serve MCP on `internal_port`.
    pub fn command(&self, internal_port: u16) -> Option<Vec<String>> {
        match self {
            Self::Grafana => Some(vec![
                "--transport".to_string(),
                "streamable-http".to_string(),
                "--address".to_string(),
                format!("0.0.0.0:{internal_port}"),
            ]),
            Self::Alertmanager | Self::Genesys => None,
        }
    }

    /// Environment entries added unless the caller already provides them.
    pub fn default_env(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Alertmanager => &[("MCP_TRANSPORT", "sse")],
            Self::Grafana | Self::Genesys => &[],
        }
    }
}

impl fmt::Display for SidecarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SidecarKind {
    type Err = UnknownSidecarKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownSidecarKind(s.to_string()))
    }
}

/// Host port range start and the port the service listens on inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// First host port tried for this kind.
    pub start: u16,
    /// Port inside the container.
    pub internal: u16,
}

/// One sidecar a tenant asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarRequest {
    pub kind: SidecarKind,
    /// Forwarded verbatim into the container environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl SidecarRequest {
    pub fn new(kind: SidecarKind) -> Self {
        Self {
            kind,
            env: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// A (tenant, sidecar kind) pair. The allocation and deduplication key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContainerIdentity {
    pub tenant: String,
    pub kind: SidecarKind,
}

impl ContainerIdentity {
    pub fn new(tenant: impl Into<String>, kind: SidecarKind) -> Self {
        Self {
            tenant: tenant.into(),
            kind,
        }
    }

    /// Deterministic container name for this identity.
    ///
    /// Tenant names that need sanitizing get a short digest suffix so that two
    /// tenants never collapse onto the same container.
    pub fn container_name(&self) -> String {
        let safe = sanitize_tenant(&self.tenant);
        if safe == self.tenant {
            format!("{CONTAINER_PREFIX}-{}-{safe}", self.kind)
        } else {
            format!(
                "{CONTAINER_PREFIX}-{}-{safe}-{}",
                self.kind,
                tenant_digest(&self.tenant)
            )
        }
    }
}

impl fmt::Display for ContainerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.kind)
    }
}

/// Lowercase, spaces to dashes, and drop anything Docker rejects in names.
fn sanitize_tenant(tenant: &str) -> String {
    tenant
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

fn tenant_digest(tenant: &str) -> String {
    Sha256::digest(tenant.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Fully resolved desired state for one container run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    pub identity: ContainerIdentity,
    pub image: String,
    #[serde(skip_serializing)]
    pub env: BTreeMap<String, String>,
    /// Allocated host port. Zero when allocation failed.
    pub host_port: u16,
    pub internal_port: u16,
    pub health_path: String,
    pub command: Option<Vec<String>>,
}

impl ContainerSpec {
    /// Build the spec for `request`, merging the kind's default environment
    /// underneath the caller's entries.
    pub fn build(
        tenant: &str,
        request: &SidecarRequest,
        image: impl Into<String>,
        ports: PortRange,
        host_port: u16,
    ) -> Self {
        let kind = request.kind;
        let mut env = request.env.clone();
        for (key, value) in kind.default_env() {
            env.entry((*key).to_string())
                .or_insert_with(|| (*value).to_string());
        }

        Self {
            identity: ContainerIdentity::new(tenant, kind),
            image: image.into(),
            env,
            host_port,
            internal_port: ports.internal,
            health_path: kind.endpoint_path().to_string(),
            command: kind.command(ports.internal),
        }
    }

    pub fn container_name(&self) -> String {
        self.identity.container_name()
    }

    pub fn kind(&self) -> SidecarKind {
        self.identity.kind
    }

    /// MCP endpoint URL on the host. Also the health probe target.
    pub fn url(&self) -> String {
        format!(
            "http://{ENDPOINT_HOST}:{}/{}",
            self.host_port,
            self.health_path.trim_start_matches('/')
        )
    }

    /// Labels attached at creation for later orphan detection.
    pub fn labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_MANAGED.to_string(), "true".to_string()),
            (LABEL_TENANT.to_string(), self.identity.tenant.clone()),
            (LABEL_SIDECAR.to_string(), self.identity.kind.to_string()),
        ])
    }
}
