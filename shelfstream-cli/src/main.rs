//! Shelfstream CLI - Operational tooling
//!
//! This binary provides operational commands over the Shelfstream library:
//! status introspection, quota inspection, and configuration validation.

mod commands;
mod error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shelfstream")]
#[command(about = "Operational tooling for the Shelfstream collection core", long_about = None)]
#[command(version = shelfstream::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show a point-in-time snapshot of quota, sessions, and network status
    Status(commands::status::StatusArgs),
    /// Inspect quota usage and whether a request would be admitted
    CheckQuota(commands::quota::QuotaArgs),
    /// Validate configuration values against the core's invariants
    ValidateConfig(commands::config::ConfigArgs),
}

#[tokio::main]
async fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Status(args) => commands::status::run(args).await,
        Commands::CheckQuota(args) => commands::quota::run(args),
        Commands::ValidateConfig(args) => commands::config::run(args),
    };

    if let Err(e) = result {
        e.exit();
    }
}

/// Console logging, quiet by default and controlled via RUST_LOG.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
