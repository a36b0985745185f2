//! Reserve command implementation

use anyhow::{Context, Result};
use berth_core::{Container, Manifest};
use berth_registry::RegistryHandle;

use super::{join_ports, parse_id};

pub async fn execute(
    handle: &RegistryHandle,
    id: &str,
    cpu: u32,
    memory: u64,
    labels: Vec<(String, String)>,
) -> Result<()> {
    tracing::info!(container_id = id, cpu, memory, "Reserving container");

    let container_id = parse_id(id)?;
    let manifest = labels
        .into_iter()
        .fold(Manifest::new(cpu, memory), |m, (key, value)| {
            m.with_label(key, value)
        });

    let container = handle
        .reserve(container_id, manifest)
        .await
        .with_context(|| format!("Failed to reserve '{id}'"))?;

    print_container("✅ Reserved", &container);

    Ok(())
}

pub(super) fn print_container(heading: &str, container: &Container) {
    println!("\n{heading} {}", container.id);
    println!("{:-<60}", "");
    println!("Host:            {}", container.host);
    println!("Primary port:    {}", container.primary_port);
    println!("SSH port:        {}", container.ssh_port);
    println!("Secondary ports: {}", join_ports(&container.secondary_ports));
    println!("CPU shares:      {}", container.manifest.cpu_shares);
    println!("Memory:          {} MB", container.manifest.memory_limit);
    for (key, value) in &container.manifest.labels {
        println!("Label:           {key}={value}");
    }
    println!("{:-<60}", "");
}
