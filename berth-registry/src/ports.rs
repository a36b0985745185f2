//! Slot-to-port mapping
//!
//! Ports are laid out in bands, each `num_containers` wide, starting at
//! `min_port`:
//!
//! ```text
//! band 0        band 1        band 2 ..
//! primary       ssh           secondary[0] ..
//! min+s         min+N+s       min+N*(i+2)+s
//! ```
//!
//! A slot index alone determines every port of a container, so two slots
//! never share a port and allocation needs no search.

use berth_core::Result;

use crate::RegistryConfig;

/// Ports assigned to one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAssignment {
    /// Main service port
    pub primary: u16,
    /// SSH / management port
    pub ssh: u16,
    /// Additional service ports
    pub secondary: Vec<u16>,
}

/// Pure slot-index to port arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortAllocator {
    min_port: u16,
    num_containers: u16,
    num_secondary_ports: u16,
}

impl PortAllocator {
    /// Build an allocator from a configuration
    ///
    /// # Errors
    /// Returns error if the bands do not fit below port 65535.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        config.check_port_range()?;
        Ok(Self {
            min_port: config.min_port,
            num_containers: config.num_containers,
            num_secondary_ports: config.num_secondary_ports,
        })
    }

    /// Number of slots
    #[must_use]
    pub const fn num_slots(&self) -> u16 {
        self.num_containers
    }

    /// All slots, in ascending order
    pub fn slots(&self) -> impl Iterator<Item = u16> {
        0..self.num_containers
    }

    /// Whether `slot` is in `[0, num_containers)`
    #[must_use]
    pub const fn contains(&self, slot: u16) -> bool {
        slot < self.num_containers
    }

    /// Primary port of `slot`
    #[must_use]
    pub fn primary_port(&self, slot: u16) -> u16 {
        self.band_port(0, slot)
    }

    /// Slot whose primary port is `port`, if `port` is in band 0
    #[must_use]
    pub fn slot_of(&self, port: u16) -> Option<u16> {
        port.checked_sub(self.min_port)
            .filter(|slot| self.contains(*slot))
    }

    /// Every port belonging to `slot`
    #[must_use]
    pub fn assign(&self, slot: u16) -> PortAssignment {
        debug_assert!(self.contains(slot), "slot {slot} out of range");

        PortAssignment {
            primary: self.band_port(0, slot),
            ssh: self.band_port(1, slot),
            secondary: (0..self.num_secondary_ports)
                .map(|i| self.band_port(u32::from(i) + 2, slot))
                .collect(),
        }
    }

    // Validation at construction keeps every band below 65536.
    #[allow(clippy::cast_possible_truncation)]
    fn band_port(&self, band: u32, slot: u16) -> u16 {
        (u32::from(self.min_port) + u32::from(self.num_containers) * band + u32::from(slot)) as u16
    }
}
