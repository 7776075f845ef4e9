//! CLI command handling.
//!
//! Provides subcommands for:
//! - Starting tenant sidecars and keeping them warm (`up`)
//! - Removing orphaned managed containers (`cleanup`)
//! - Listing configured tenants (`tenants`)
//! - Checking the Docker daemon and images (`doctor`)

mod cleanup;
mod doctor;
mod tenants;
mod up;

pub use cleanup::run_cleanup_command;
pub use doctor::run_doctor_command;
pub use tenants::run_tenants_command;
pub use up::{UpArgs, run_up_command};

use clap::{ColorChoice, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mcpfleet")]
#[command(about = "Run per-tenant MCP server sidecars with a bounded warm pool")]
#[command(
    long_about = "mcpfleet starts, health-checks and retires MCP server containers per tenant.\nExamples:\n  mcpfleet up acme  # Start acme's sidecars\n  mcpfleet cleanup  # Remove orphaned containers"
)]
#[command(version)]
#[command(color = ColorChoice::Auto)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Fleet file path (defaults to ~/.config/mcpfleet/config.toml if present)
    #[arg(short, long, global = true, env = "MCPFLEET_CONFIG")]
    pub config: Option<std::path::PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start tenant sidecars and keep them warm until interrupted
    #[command(
        about = "Start tenant sidecars",
        long_about = "Starts the named tenants (or the default tenant), then evicts idle tenants until Ctrl-C.\nExample: mcpfleet up acme globex --no-wait"
    )]
    Up(UpArgs),

    /// Remove managed containers no tenant tracks
    #[command(
        about = "Remove orphaned containers",
        long_about = "Force-removes every container labelled mcpfleet.managed=true.\nExample: mcpfleet cleanup"
    )]
    Cleanup,

    /// List tenants from the fleet file
    #[command(about = "List configured tenants")]
    Tenants {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe the Docker daemon and configured images
    #[command(
        about = "Run diagnostics",
        long_about = "Checks Docker connectivity, config and image availability.\nExample: mcpfleet doctor"
    )]
    Doctor,
}
