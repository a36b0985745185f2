//! Registry transition events with structured tracing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

use crate::ContainerId;

/// Events emitted by the registry as it serves requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    /// A reservation succeeded
    Reserved {
        /// Container ID
        id: ContainerId,
        /// Slot index the container occupies
        slot: u16,
        /// Assigned primary port
        primary_port: u16,
        /// Granted CPU shares
        cpu_shares: u32,
        /// Granted memory in MB
        memory_limit: u64,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// A reservation was refused
    Rejected {
        /// Container ID
        id: ContainerId,
        /// Why the request was refused
        reason: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// A container was torn down and its slot released
    TornDown {
        /// Container ID
        id: ContainerId,
        /// Slot index returned to the free pool
        slot: Option<u16>,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// The teardown hook reported an error; bookkeeping was released anyway
    TeardownHookFailed {
        /// Container ID
        id: ContainerId,
        /// Hook error message
        message: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },

    /// Writing the snapshot failed; in-memory state is kept
    PersistFailed {
        /// Error message
        message: String,
        /// Timestamp
        #[serde(with = "systemtime_serde")]
        timestamp: SystemTime,
    },
}

impl RegistryEvent {
    /// Get the container ID, if the event concerns a single container
    #[must_use]
    pub const fn container_id(&self) -> Option<&ContainerId> {
        match self {
            Self::Reserved { id, .. }
            | Self::Rejected { id, .. }
            | Self::TornDown { id, .. }
            | Self::TeardownHookFailed { id, .. } => Some(id),
            Self::PersistFailed { .. } => None,
        }
    }

    /// Get the timestamp from any event
    #[must_use]
    pub const fn timestamp(&self) -> SystemTime {
        match self {
            Self::Reserved { timestamp, .. }
            | Self::Rejected { timestamp, .. }
            | Self::TornDown { timestamp, .. }
            | Self::TeardownHookFailed { timestamp, .. }
            | Self::PersistFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Check if this is a critical event
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(
            self,
            Self::TeardownHookFailed { .. } | Self::PersistFailed { .. }
        )
    }

    /// Emit structured tracing event
    pub fn emit_trace(&self) {
        match self {
            Self::Reserved {
                id,
                slot,
                primary_port,
                cpu_shares,
                memory_limit,
                ..
            } => {
                tracing::info!(
                    container_id = %id,
                    slot,
                    primary_port,
                    cpu_shares,
                    memory_limit,
                    event = "reserved",
                    "Container reserved"
                );
            }
            Self::Rejected { id, reason, .. } => {
                tracing::info!(
                    container_id = %id,
                    reason = %reason,
                    event = "rejected",
                    "Reservation rejected"
                );
            }
            Self::TornDown { id, slot, .. } => {
                tracing::info!(
                    container_id = %id,
                    slot,
                    event = "torn_down",
                    "Container torn down"
                );
            }
            Self::TeardownHookFailed { id, message, .. } => {
                tracing::warn!(
                    container_id = %id,
                    message = %message,
                    event = "teardown_hook_failed",
                    "Teardown hook failed"
                );
            }
            Self::PersistFailed { message, .. } => {
                tracing::error!(
                    message = %message,
                    event = "persist_failed",
                    "Failed to persist registry snapshot"
                );
            }
        }
    }
}

impl fmt::Display for RegistryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reserved {
                id, primary_port, ..
            } => write!(f, "Container {id} reserved on port {primary_port}"),
            Self::Rejected { id, reason, .. } => {
                write!(f, "Container {id} rejected: {reason}")
            }
            Self::TornDown { id, .. } => write!(f, "Container {id} torn down"),
            Self::TeardownHookFailed { id, message, .. } => {
                write!(f, "Container {id} teardown hook failed: {message}")
            }
            Self::PersistFailed { message, .. } => {
                write!(f, "Snapshot persist failed: {message}")
            }
        }
    }
}

// Custom SystemTime serialization
mod systemtime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_u64(since_epoch.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}
