//! Error types for Berth

use thiserror::Error;

/// Berth error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Every container slot is occupied
    #[error("No free containers to reserve ({total} slots in use)")]
    CapacityExceeded {
        /// Number of slots on this host
        total: u16,
    },

    /// The requested ID already belongs to an active container
    #[error("The ID ({id}) is in use")]
    DuplicateId {
        /// Conflicting container ID
        id: String,
    },

    /// Not enough CPU shares left for the manifest
    #[error("Not enough CPU shares to reserve ({requested} requested, {available} available)")]
    InsufficientCpu {
        /// Shares asked for by the manifest
        requested: u64,
        /// Shares still unallocated
        available: u64,
    },

    /// Not enough memory left for the manifest
    #[error("Not enough memory to reserve ({requested} MB requested, {available} MB available)")]
    InsufficientMemory {
        /// Megabytes asked for by the manifest
        requested: u64,
        /// Megabytes still unallocated
        available: u64,
    },

    /// The container-execution side could not stop a container
    #[error("Teardown of {id} failed: {message}")]
    Teardown {
        /// Container ID
        id: String,
        /// Error message
        message: String,
    },

    /// Malformed container ID
    #[error("Invalid container ID: {message}")]
    InvalidId {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The registry is no longer serving requests
    #[error("Registry has stopped")]
    RegistryStopped,

    /// The registry thread panicked
    #[error("Registry thread panicked")]
    RegistryPanicked,
}

impl Error {
    /// Whether this is one of the reservation rejections.
    ///
    /// Rejections leave registry state untouched and only succeed on retry
    /// once the request changes or capacity frees up.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. }
                | Self::DuplicateId { .. }
                | Self::InsufficientCpu { .. }
                | Self::InsufficientMemory { .. }
        )
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::RegistryStopped
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for Error {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::RegistryStopped
    }
}

/// Result type alias for Berth operations
pub type Result<T> = std::result::Result<T, Error>;
