//! Resource registry for a single container host
//!
//! The registry owns every piece of mutable allocation state (active
//! containers, the free slot pool, and the CPU / memory counters) and
//! serves requests one at a time from a single inbound queue. Callers reach
//! it only through [`RegistryHandle`], which hands back value copies.
//!
//! ```no_run
//! use berth_core::{ContainerId, Manifest};
//! use berth_registry::{Registry, RegistryConfig};
//!
//! # fn example() -> berth_core::Result<()> {
//! let config = RegistryConfig::new("/var/lib/berth")
//!     .with_containers(4)
//!     .with_cpu_shares(4)
//!     .with_memory_limit(4096);
//! let registry = Registry::spawn(config)?;
//! let handle = registry.handle();
//!
//! let container = handle.reserve_blocking(ContainerId::new("web")?, Manifest::new(1, 512))?;
//! println!("web listens on {}", container.primary_port);
//!
//! assert!(handle.teardown_blocking(ContainerId::new("web")?)?);
//! registry.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

mod actor;
pub mod config;
pub mod handle;
pub mod hook;
pub mod ledger;
pub mod ports;
pub mod store;

pub use actor::Lifecycle;
pub use config::RegistryConfig;
pub use handle::{Registry, RegistryBuilder, RegistryHandle};
pub use hook::{MockTeardown, NoopTeardown, TeardownHook};
pub use ledger::Ledger;
pub use ports::{PortAllocator, PortAssignment};
pub use store::{Snapshot, Store};

// Re-export commonly used types
pub use berth_core::{Container, ContainerId, Listing, Manifest, Nums, ResourceStats};
