//! Fleet file loading from disk.
//!
//! Each test writes its own file into a tempdir and resolves it against a
//! fixed environment, never the process one.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tempfile::tempdir;

use mcpfleet::SidecarKind;
use mcpfleet::config::Config;
use mcpfleet::error::ConfigError;

fn no_env(_key: &str) -> Result<Option<String>, ConfigError> {
    Ok(None)
}

fn load(path: &Path) -> Result<Config, ConfigError> {
    Config::load_with(Some(path), &no_env)
}

const FLEET: &str = r#"
default_tenant = "Globex"

[settings]
max_warm = 2
network_name = "ops-net"
health_timeout_secs = 20
stop_grace_secs = 3

[settings.ports.genesys]
start = 19200
internal = 8080

[settings.images]
grafana = "registry.local/mcp-grafana:0.4"

[[tenants]]
name = "Acme Corp"

[[tenants.sidecars]]
kind = "grafana"
env = { GRAFANA_URL = "https://grafana.acme.example" }

[[tenants]]
name = "Globex"
description = "EU on-call"

[[tenants.sidecars]]
kind = "alertmanager"

[[tenants.sidecars]]
kind = "genesys"
"#;

#[test]
fn fleet_file_is_applied_over_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fleet.toml");
    std::fs::write(&path, FLEET).unwrap();

    let config = load(&path).unwrap();

    assert_eq!(config.source.as_deref(), Some(path.as_path()));
    let settings = &config.orchestrator;
    assert_eq!(settings.max_warm, 2);
    assert_eq!(settings.network_name, "ops-net");
    assert_eq!(settings.health_timeout, Duration::from_secs(20));
    assert_eq!(settings.stop_grace, Duration::from_secs(3));
    // Untouched values keep their defaults.
    assert_eq!(settings.health_interval, Duration::from_secs(2));
    assert_eq!(settings.idle_timeout, Duration::from_secs(1800));
    assert_eq!(settings.port_range(SidecarKind::Genesys).start, 19200);
    assert_eq!(settings.image(SidecarKind::Grafana), "registry.local/mcp-grafana:0.4");
    assert_eq!(
        settings.image(SidecarKind::Alertmanager),
        "mcpfleet/alertmanager-mcp:latest"
    );

    let default = config.default_tenant().unwrap();
    assert_eq!(default.name, "Globex");
    let kinds: Vec<SidecarKind> = default.sidecars.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![SidecarKind::Alertmanager, SidecarKind::Genesys]);

    let acme = config.tenant("Acme Corp").unwrap();
    assert_eq!(
        acme.sidecars[0].env.get("GRAFANA_URL").map(String::as_str),
        Some("https://grafana.acme.example")
    );
}

#[test]
fn malformed_file_reports_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "[settings\nmax_warm = 2\n").unwrap();

    let err = load(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("broken.toml"));
}

#[test]
fn unknown_sidecar_kind_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fleet.toml");
    std::fs::write(
        &path,
        "[[tenants]]\nname = \"acme\"\n\n[[tenants.sidecars]]\nkind = \"prometheus\"\n",
    )
    .unwrap();

    assert!(load(&path).is_err());
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn environment_overrides_fleet_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fleet.toml");
    std::fs::write(&path, FLEET).unwrap();

    let env = HashMap::from([
        ("MCPFLEET_MAX_WARM", "7"),
        ("MCPFLEET_NETWORK", "  "),
    ]);
    let lookup = |key: &str| -> Result<Option<String>, ConfigError> {
        Ok(env.get(key).map(|v| v.to_string()))
    };
    let config = Config::load_with(Some(path.as_path()), &lookup).unwrap();

    assert_eq!(config.orchestrator.max_warm, 7);
    // Blank values count as unset.
    assert_eq!(config.orchestrator.network_name, "ops-net");
}

#[test]
fn invalid_environment_value_names_the_key() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("fleet.toml");
    std::fs::write(&path, FLEET).unwrap();

    let lookup = |key: &str| -> Result<Option<String>, ConfigError> {
        Ok((key == "MCPFLEET_PORT_WINDOW").then(|| "wide".to_string()))
    };
    let err = Config::load_with(Some(path.as_path()), &lookup).unwrap_err();
    match err {
        ConfigError::InvalidValue { key, .. } => assert_eq!(key, "MCPFLEET_PORT_WINDOW"),
        other => panic!("unexpected error: {other}"),
    }
}
