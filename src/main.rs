//! mcpfleet - Main entry point.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mcpfleet::{
    cli::{
        Cli, Command, run_cleanup_command, run_doctor_command, run_tenants_command,
        run_up_command,
    },
    config::Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    let _ = dotenvy::dotenv();

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mcpfleet=info"));

    if cli.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    let config = Config::load(cli.config.as_deref())?;
    if let Some(path) = &config.source {
        tracing::debug!("Loaded fleet file {}", path.display());
    }

    match cli.command {
        Command::Up(args) => run_up_command(&config, args).await,
        Command::Cleanup => run_cleanup_command(&config).await,
        Command::Tenants { json } => run_tenants_command(&config, json),
        Command::Doctor => run_doctor_command(&config).await,
    }
}
