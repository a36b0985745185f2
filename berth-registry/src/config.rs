//! Registry configuration

use berth_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Highest usable port number
const MAX_PORT: u64 = 65_535;

/// Host capacity and persistence settings
///
/// Validated once by [`RegistryConfig::validate`] before the registry starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Image registry host handed to downstream collaborators
    pub registry_host: String,

    /// Host name stamped into every reserved container
    pub advertise_host: String,

    /// Directory holding the `containers` and `ports` snapshots
    pub save_dir: PathBuf,

    /// Number of container slots
    pub num_containers: u16,

    /// Secondary ports assigned to each container
    pub num_secondary_ports: u16,

    /// First port of the managed range
    pub min_port: u16,

    /// Total CPU shares on the host
    pub cpu_shares: u32,

    /// Total memory on the host in MB
    pub memory_limit: u64,

    /// Bound of the inbound request queue
    pub queue_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_host: String::new(),
            advertise_host: "localhost".to_string(),
            save_dir: PathBuf::from("/var/lib/berth"),
            num_containers: 100,
            num_secondary_ports: 5,
            min_port: 61_000,
            cpu_shares: 100,
            memory_limit: 4096,
            queue_capacity: 64,
        }
    }
}

impl RegistryConfig {
    /// Create a configuration saving into `save_dir`, all else default
    #[must_use]
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
            ..Self::default()
        }
    }

    /// Set the registry host
    #[must_use]
    pub fn with_registry_host(mut self, host: impl Into<String>) -> Self {
        self.registry_host = host.into();
        self
    }

    /// Set the advertised container host
    #[must_use]
    pub fn with_advertise_host(mut self, host: impl Into<String>) -> Self {
        self.advertise_host = host.into();
        self
    }

    /// Set the number of container slots
    #[must_use]
    pub const fn with_containers(mut self, num: u16) -> Self {
        self.num_containers = num;
        self
    }

    /// Set the number of secondary ports per container
    #[must_use]
    pub const fn with_secondary_ports(mut self, num: u16) -> Self {
        self.num_secondary_ports = num;
        self
    }

    /// Set the first port of the managed range
    #[must_use]
    pub const fn with_min_port(mut self, port: u16) -> Self {
        self.min_port = port;
        self
    }

    /// Set total CPU shares
    #[must_use]
    pub const fn with_cpu_shares(mut self, shares: u32) -> Self {
        self.cpu_shares = shares;
        self
    }

    /// Set total memory in MB
    #[must_use]
    pub const fn with_memory_limit(mut self, mb: u64) -> Self {
        self.memory_limit = mb;
        self
    }

    /// Set the inbound queue bound
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Highest port the configured bands reach
    ///
    /// Computed in 64-bit so an oversized layout is reported rather than wrapped.
    #[must_use]
    pub fn max_port(&self) -> u64 {
        let bands = u64::from(self.num_secondary_ports) + 2;
        (u64::from(self.min_port) + bands * u64::from(self.num_containers)).saturating_sub(1)
    }

    /// Check the configuration
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the port bands overflow 16-bit
    /// port space or the queue bound is zero.
    pub fn validate(&self) -> Result<()> {
        self.check_port_range()?;

        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig {
                message: "queue_capacity must be at least 1".to_string(),
            });
        }

        if u32::from(self.num_containers) != self.cpu_shares {
            tracing::warn!(
                num_containers = self.num_containers,
                cpu_shares = self.cpu_shares,
                "For maximum efficiency set num_containers equal to cpu_shares"
            );
        }

        Ok(())
    }

    /// Check only that every port band fits below 65536
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the bands overflow.
    pub fn check_port_range(&self) -> Result<()> {
        let max_port = self.max_port();
        if max_port > MAX_PORT {
            return Err(Error::InvalidConfig {
                message: format!(
                    "min_port + (num_secondary_ports + 2) * num_containers - 1 = {max_port} > {MAX_PORT}"
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RegistryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_port(), 61_699);
    }

    #[test]
    fn test_port_overflow_rejected() {
        let config = RegistryConfig::new("/tmp/berth")
            .with_min_port(65_000)
            .with_containers(200)
            .with_secondary_ports(1);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_port_range_exact_fit() {
        // 65_536 - 3 * 10 = 65_506; last port lands exactly on 65_535
        let config = RegistryConfig::new("/tmp/berth")
            .with_min_port(65_506)
            .with_containers(10)
            .with_secondary_ports(1);
        assert_eq!(config.max_port(), 65_535);
        assert!(config.validate().is_ok());

        let config = config.with_min_port(65_507);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_check_port_range() {
        let config = RegistryConfig::default().with_queue_capacity(0);
        assert!(config.check_port_range().is_ok());

        let config = config.with_min_port(65_000);
        assert!(matches!(
            config.check_port_range(),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_zero_queue_rejected() {
        let config = RegistryConfig::default().with_queue_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RegistryConfig =
            serde_json::from_str(r#"{"save_dir":"/srv/berth","num_containers":8}"#).unwrap();
        assert_eq!(config.save_dir, PathBuf::from("/srv/berth"));
        assert_eq!(config.num_containers, 8);
        assert_eq!(config.min_port, 61_000);
        assert_eq!(config.advertise_host, "localhost");
    }
}
