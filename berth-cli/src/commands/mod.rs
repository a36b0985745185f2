use anyhow::{Context, Result};
use berth_core::ContainerId;
use berth_registry::{Registry, RegistryConfig, RegistryHandle};

use crate::cli::Commands;

pub mod get;
pub mod list;
pub mod nums;
pub mod reserve;
pub mod teardown;

/// Start the registry, run one command against it, and shut it down
pub async fn dispatch(config: RegistryConfig, command: Commands) -> Result<()> {
    let registry = Registry::spawn(config).context("Failed to start registry")?;
    let handle = registry.handle();

    let result = run(&handle, command).await;

    registry
        .shutdown_async()
        .await
        .context("Registry did not shut down cleanly")?;

    result
}

async fn run(handle: &RegistryHandle, command: Commands) -> Result<()> {
    match command {
        Commands::Reserve {
            id,
            cpu,
            memory,
            labels,
        } => reserve::execute(handle, &id, cpu, memory, labels).await,

        Commands::Teardown { id } => teardown::execute(handle, &id).await,

        Commands::Get { id } => get::execute(handle, &id).await,

        Commands::List { json } => list::execute(handle, json).await,

        Commands::Nums { json } => nums::execute(handle, json).await,
    }
}

fn parse_id(id: &str) -> Result<ContainerId> {
    ContainerId::new(id).context("Invalid container ID")
}

fn join_ports(ports: &[u16]) -> String {
    if ports.is_empty() {
        return "-".to_string();
    }

    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
