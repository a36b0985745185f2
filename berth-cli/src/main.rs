//! Berth CLI
//!
//! Runs one registry operation against the snapshot in the save directory.

use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::Cli;

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Setup logging based on verbosity; RUST_LOG wins when set
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Execute the command
    let result = commands::dispatch(cli.registry.to_config(), cli.command).await;

    // Handle errors
    if let Err(e) = result {
        eprintln!("❌ Error: {e:#}");
        process::exit(1);
    }
}
