//! CLI argument definitions

use berth_registry::RegistryConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Container slot, port and resource ledger for a single host", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub registry: RegistryArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Host capacity, shared by every subcommand
#[derive(Args)]
pub struct RegistryArgs {
    /// Directory holding the registry snapshot
    #[arg(long, global = true, default_value = "/var/lib/berth")]
    pub save_dir: PathBuf,

    /// Number of container slots
    #[arg(long, global = true, default_value_t = 100)]
    pub num_containers: u16,

    /// Secondary ports per container
    #[arg(long, global = true, default_value_t = 5)]
    pub secondary_ports: u16,

    /// First port of the managed range
    #[arg(long, global = true, default_value_t = 61_000)]
    pub min_port: u16,

    /// Total CPU shares on the host
    #[arg(long, global = true, default_value_t = 100)]
    pub cpu_shares: u32,

    /// Total memory on the host in MB
    #[arg(long, global = true, default_value_t = 4096)]
    pub memory_limit: u64,

    /// Host name recorded for reserved containers
    #[arg(long, global = true, default_value = "localhost")]
    pub host: String,

    /// Image registry host
    #[arg(long, global = true, default_value = "")]
    pub registry_host: String,
}

impl RegistryArgs {
    pub fn to_config(&self) -> RegistryConfig {
        RegistryConfig::new(&self.save_dir)
            .with_containers(self.num_containers)
            .with_secondary_ports(self.secondary_ports)
            .with_min_port(self.min_port)
            .with_cpu_shares(self.cpu_shares)
            .with_memory_limit(self.memory_limit)
            .with_advertise_host(&self.host)
            .with_registry_host(&self.registry_host)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reserve a container slot
    Reserve {
        /// Container ID
        #[arg(short, long)]
        id: String,

        /// CPU shares to reserve
        #[arg(long, default_value_t = 1)]
        cpu: u32,

        /// Memory to reserve in MB
        #[arg(long, default_value_t = 512)]
        memory: u64,

        /// Deployment label (key=value), repeatable
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Tear down a container and release its slot
    Teardown {
        /// Container ID
        #[arg(short, long)]
        id: String,
    },

    /// Show one container
    Get {
        /// Container ID
        #[arg(short, long)]
        id: String,
    },

    /// List containers and free ports
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show total, used and free resources
    Nums {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}
