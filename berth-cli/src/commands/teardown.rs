//! Teardown command implementation

use anyhow::{Context, Result};
use berth_registry::RegistryHandle;

use super::parse_id;

pub async fn execute(handle: &RegistryHandle, id: &str) -> Result<()> {
    tracing::info!(container_id = id, "Tearing down container");

    let container_id = parse_id(id)?;
    let removed = handle
        .teardown(container_id)
        .await
        .context("Teardown request failed")?;

    if !removed {
        anyhow::bail!("Container '{id}' is not reserved");
    }

    println!("🧹 Torn down {id}");

    Ok(())
}
