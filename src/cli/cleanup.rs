use crate::config::Config;
use crate::orchestrator::Orchestrator;

/// Remove managed containers left behind by an earlier run.
///
/// A fresh process tracks nothing, so every managed container counts.
pub async fn run_cleanup_command(config: &Config) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::docker(config.orchestrator.clone())?;
    let removed = orchestrator.cleanup_orphans().await?;
    println!("Removed {removed} orphaned container(s)");
    Ok(())
}
