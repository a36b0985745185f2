//! Get command implementation

use anyhow::{Context, Result};
use berth_registry::RegistryHandle;

use super::parse_id;
use super::reserve::print_container;

pub async fn execute(handle: &RegistryHandle, id: &str) -> Result<()> {
    let container_id = parse_id(id)?;

    let container = handle
        .get(container_id)
        .await
        .context("Get request failed")?
        .with_context(|| format!("Container '{id}' is not reserved"))?;

    print_container("📦 Container", &container);

    Ok(())
}
