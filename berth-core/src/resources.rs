//! Resource accounting value objects

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Container, ContainerId};

/// Total / used / free triple for one resource dimension
///
/// `free` is always `total - used`, saturating at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceStats {
    /// Capacity of the host
    pub total: u64,

    /// Amount held by active containers
    pub used: u64,

    /// Amount still available
    pub free: u64,
}

impl ResourceStats {
    /// Build a triple from a total and the used amount
    #[must_use]
    pub const fn new(total: u64, used: u64) -> Self {
        Self {
            total,
            used,
            free: total.saturating_sub(used),
        }
    }
}

impl fmt::Display for ResourceStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} used={} free={}",
            self.total, self.used, self.free
        )
    }
}

/// Aggregate usage for the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Nums {
    /// Container slots
    pub containers: ResourceStats,

    /// CPU shares
    pub cpu_shares: ResourceStats,

    /// Memory in MB
    pub memory: ResourceStats,
}

/// Point-in-time copy of every active container and the unused primary ports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Active containers by ID
    pub containers: BTreeMap<ContainerId, Container>,

    /// Primary ports of free slots, in allocation order
    pub free_ports: Vec<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_stats_free() {
        let stats = ResourceStats::new(10, 6);
        assert_eq!(stats.free, 4);

        let overdrawn = ResourceStats::new(4, 6);
        assert_eq!(overdrawn.free, 0);
    }

    #[test]
    fn resource_stats_display() {
        assert_eq!(
            ResourceStats::new(8, 3).to_string(),
            "total=8 used=3 free=5"
        );
    }

    #[test]
    fn nums_serde() {
        let nums = Nums {
            containers: ResourceStats::new(4, 1),
            cpu_shares: ResourceStats::new(4, 2),
            memory: ResourceStats::new(1024, 512),
        };

        let json = serde_json::to_string(&nums).unwrap();
        let deserialized: Nums = serde_json::from_str(&json).unwrap();
        assert_eq!(nums, deserialized);
    }
}
