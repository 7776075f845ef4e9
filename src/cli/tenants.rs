use serde::Serialize;

use crate::config::Config;
use crate::sidecar::config::SidecarKind;

/// Tenant listing without environment values, which may carry credentials.
#[derive(Debug, Serialize)]
struct TenantView<'a> {
    name: &'a str,
    description: Option<&'a str>,
    default: bool,
    sidecars: Vec<SidecarKind>,
}

fn tenant_views(config: &Config) -> Vec<TenantView<'_>> {
    let default = config.default_tenant().map(|t| t.name.as_str());
    config
        .tenants
        .iter()
        .map(|t| TenantView {
            name: &t.name,
            description: t.description.as_deref(),
            default: Some(t.name.as_str()) == default,
            sidecars: t.sidecars.iter().map(|s| s.kind).collect(),
        })
        .collect()
}

pub fn run_tenants_command(config: &Config, json: bool) -> anyhow::Result<()> {
    let views = tenant_views(config);

    if json {
        println!("{}", serde_json::to_string_pretty(&views)?);
        return Ok(());
    }

    if views.is_empty() {
        match &config.source {
            Some(path) => println!("No tenants in {}", path.display()),
            None => println!("No fleet file found. Pass --config <PATH>."),
        }
        return Ok(());
    }

    for view in views {
        let marker = if view.default { " (default)" } else { "" };
        let kinds: Vec<&str> = view.sidecars.iter().map(SidecarKind::as_str).collect();
        println!("{}{}: {}", view.name, marker, kinds.join(", "));
        if let Some(description) = view.description {
            println!("  {description}");
        }
    }
    Ok(())
}
