//! Nums command implementation

use anyhow::{Context, Result};
use berth_registry::RegistryHandle;

pub async fn execute(handle: &RegistryHandle, json: bool) -> Result<()> {
    let nums = handle.nums().await.context("Nums request failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&nums)?);
        return Ok(());
    }

    println!("\n📊 Host resources");
    println!("{:-<60}", "");
    println!("{:<16} {:>10} {:>10} {:>10}", "", "TOTAL", "USED", "FREE");
    for (name, stats) in [
        ("Containers", nums.containers),
        ("CPU shares", nums.cpu_shares),
        ("Memory (MB)", nums.memory),
    ] {
        println!(
            "{:<16} {:>10} {:>10} {:>10}",
            name, stats.total, stats.used, stats.free
        );
    }
    println!("{:-<60}", "");

    Ok(())
}
