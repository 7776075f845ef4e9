use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::config::{Config, TenantProfile};
use crate::orchestrator::Orchestrator;
use crate::sidecar::status::TenantContainerSet;

/// How often idle tenants are looked for while `up` runs.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Args, Debug, Clone)]
pub struct UpArgs {
    /// Tenants to start, in order (defaults to the configured default tenant)
    pub tenants: Vec<String>,

    /// Return as soon as containers run, without waiting for health checks
    #[arg(long)]
    pub no_wait: bool,

    /// Print tenant status as JSON
    #[arg(long)]
    pub json: bool,

    /// Leave containers running on exit
    #[arg(long)]
    pub keep: bool,
}

/// Start tenants, then evict idle ones until Ctrl-C.
pub async fn run_up_command(config: &Config, args: UpArgs) -> anyhow::Result<()> {
    let profiles = select_profiles(config, &args.tenants)?;
    let orchestrator = Arc::new(Orchestrator::docker(config.orchestrator.clone())?);

    if !orchestrator.is_available().await {
        anyhow::bail!("Docker daemon is not reachable. Run `mcpfleet doctor` for details.");
    }

    let removed = orchestrator.cleanup_orphans().await?;
    if removed > 0 {
        println!("Removed {removed} orphaned container(s)");
    }

    for profile in profiles {
        let set = orchestrator
            .start_tenant_containers(&profile.name, &profile.sidecars, !args.no_wait)
            .await;
        print_set(&set, args.json)?;
    }

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(IDLE_CHECK_INTERVAL);
    ticker.tick().await;

    tracing::info!("Sidecars up, press Ctrl-C to stop");
    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            _ = ticker.tick() => {
                let evicted = orchestrator.evict_idle().await;
                if !evicted.is_empty() {
                    tracing::info!("Evicted idle tenant(s): {}", evicted.join(", "));
                }
            }
        }
    }

    if args.keep {
        tracing::info!("Leaving containers running (--keep)");
    } else {
        orchestrator.stop_all().await;
    }
    Ok(())
}

fn select_profiles<'a>(
    config: &'a Config,
    names: &[String],
) -> anyhow::Result<Vec<&'a TenantProfile>> {
    if names.is_empty() {
        return match config.default_tenant() {
            Some(profile) => Ok(vec![profile]),
            None => anyhow::bail!("No tenants configured. Add [[tenants]] to the fleet file."),
        };
    }

    names
        .iter()
        .map(|name| {
            config
                .tenant(name)
                .ok_or_else(|| anyhow::anyhow!("Unknown tenant '{name}'"))
        })
        .collect()
}

fn print_set(set: &TenantContainerSet, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(set)?);
        return Ok(());
    }

    println!("Tenant: {}", set.tenant);
    for (kind, status) in &set.containers {
        let detail = match &status.error {
            Some(error) => error.clone(),
            None => status.url(),
        };
        println!("  {:<13} {:<10} {}", kind.as_str(), status.state.as_str(), detail);
    }
    Ok(())
}
