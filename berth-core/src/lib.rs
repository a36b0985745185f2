//! Berth Core - Foundation types, events, and errors
//!
//! This crate provides the value types exchanged with the resource registry:
//! container records, manifests, resource accounting triples and the
//! structured events emitted on every registry transition.

#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod events;
pub mod resources;
pub mod types;

pub use error::{Error, Result};
pub use events::RegistryEvent;
pub use resources::{Listing, Nums, ResourceStats};
pub use types::{Container, ContainerId, Manifest};
