//! List command implementation

use anyhow::{Context, Result};
use berth_registry::RegistryHandle;

use super::join_ports;

pub async fn execute(handle: &RegistryHandle, json: bool) -> Result<()> {
    tracing::debug!("Listing containers");

    let listing = handle.list().await.context("List request failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("\n📋 Containers");
    println!("{:-<60}", "");

    if listing.containers.is_empty() {
        println!("No containers reserved");
    } else {
        println!(
            "{:<24} {:<8} {:<8} {:<8} {:<10}",
            "ID", "PORT", "SSH", "SHARES", "MEMORY"
        );
        for container in listing.containers.values() {
            println!(
                "{:<24} {:<8} {:<8} {:<8} {:<10}",
                container.id.as_str(),
                container.primary_port,
                container.ssh_port,
                container.manifest.cpu_shares,
                format!("{} MB", container.manifest.memory_limit)
            );
        }
    }

    println!("{:-<60}", "");
    println!("Total: {} container(s)", listing.containers.len());
    println!("Free ports: {}", join_ports(&listing.free_ports));

    Ok(())
}
