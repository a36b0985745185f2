//! Core type definitions with strong typing and validation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// Container identifier with validation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct ContainerId(String);

impl ContainerId {
    /// Maximum length for container IDs
    pub const MAX_LENGTH: usize = 64;

    /// Create a new `ContainerId` with validation
    ///
    /// # Errors
    /// Returns error if ID is invalid (empty, too long, or contains invalid characters)
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Validate a container ID
    fn validate(id: &str) -> Result<()> {
        if id.is_empty() {
            return Err(Error::InvalidId {
                message: "Container ID cannot be empty".to_string(),
            });
        }

        if id.len() > Self::MAX_LENGTH {
            return Err(Error::InvalidId {
                message: format!("Container ID too long (max {} chars)", Self::MAX_LENGTH),
            });
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(Error::InvalidId {
                message: "Container ID can only contain alphanumeric, dash, underscore, and dot"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// Get the container ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContainerId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<ContainerId> for String {
    fn from(id: ContainerId) -> Self {
        id.0
    }
}

/// Resource request attached to a reservation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Relative CPU shares
    pub cpu_shares: u32,

    /// Memory limit in MB
    pub memory_limit: u64,

    /// Deployment metadata carried through untouched
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Manifest {
    /// Create a manifest requesting `cpu_shares` and `memory_limit` MB
    #[must_use]
    pub const fn new(cpu_shares: u32, memory_limit: u64) -> Self {
        Self {
            cpu_shares,
            memory_limit,
            labels: BTreeMap::new(),
        }
    }

    /// Attach a label
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A reserved container as recorded by the registry
///
/// Ports are fixed at reservation time and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    /// Caller-supplied ID, unique among active containers
    pub id: ContainerId,

    /// Host the container is reachable on
    pub host: String,

    /// Main service port
    pub primary_port: u16,

    /// SSH / management port
    pub ssh_port: u16,

    /// Additional service ports
    pub secondary_ports: Vec<u16>,

    /// Resources granted to this container
    pub manifest: Manifest,
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} (ssh {}, {} shares, {} MB)",
            self.id,
            self.host,
            self.primary_port,
            self.ssh_port,
            self.manifest.cpu_shares,
            self.manifest.memory_limit
        )
    }
}
