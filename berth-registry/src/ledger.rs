//! Allocation state machine
//!
//! [`Ledger`] holds the authoritative container map, the free slot pool and
//! the CPU / memory counters. It is plain single-owner data: the registry
//! actor is its only owner at runtime, which is what makes every transition
//! atomic with respect to other callers.

use berth_core::{Container, ContainerId, Error, Listing, Manifest, Nums, ResourceStats, Result};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, warn};

use crate::store::Snapshot;
use crate::{PortAllocator, RegistryConfig};

/// Resource ledger for one host
#[derive(Debug, Clone)]
pub struct Ledger {
    allocator: PortAllocator,
    host: String,
    cpu_total: u64,
    memory_total: u64,
    containers: BTreeMap<ContainerId, Container>,
    free_slots: VecDeque<u16>,
    used_cpu_shares: u64,
    used_memory: u64,
}

impl Ledger {
    /// Empty ledger with every slot free
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        Self::restore(config, Snapshot::default())
    }

    /// Rebuild a ledger from a loaded snapshot
    ///
    /// Counters are always recomputed from the containers. A container on a
    /// slot already held by another loaded container is dropped. The free
    /// pool is repaired so that free and occupied slots are disjoint and
    /// together cover every slot.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid.
    pub fn restore(config: &RegistryConfig, snapshot: Snapshot) -> Result<Self> {
        let allocator = PortAllocator::new(config)?;
        let loaded = snapshot.containers.unwrap_or_default();

        // The first container (by ID) on a slot keeps it; later ones are
        // dropped so no two active containers share ports.
        let mut occupied = BTreeSet::new();
        let mut containers = BTreeMap::new();
        for (id, container) in loaded {
            match allocator.slot_of(container.primary_port) {
                Some(slot) if !occupied.insert(slot) => {
                    warn!(
                        container_id = %id,
                        slot,
                        "Dropping loaded container that shares a slot with another container"
                    );
                    continue;
                }
                Some(_) => {}
                None => warn!(
                    container_id = %id,
                    primary_port = container.primary_port,
                    "Loaded container lies outside the configured port range"
                ),
            }
            containers.insert(id, container);
        }

        let free_slots = match snapshot.free_slots {
            Some(saved) => {
                let saved_len = saved.len();
                let mut seen = BTreeSet::new();
                let mut pool: VecDeque<u16> = saved
                    .into_iter()
                    .filter(|slot| {
                        allocator.contains(*slot) && !occupied.contains(slot) && seen.insert(*slot)
                    })
                    .collect();
                let kept = pool.len();

                for slot in allocator.slots() {
                    if !occupied.contains(&slot) && !seen.contains(&slot) {
                        pool.push_back(slot);
                    }
                }

                if kept != saved_len || pool.len() != kept {
                    warn!(
                        saved = saved_len,
                        dropped = saved_len - kept,
                        added = pool.len() - kept,
                        "Repaired inconsistent free slot pool"
                    );
                }
                pool
            }
            None => allocator
                .slots()
                .filter(|slot| !occupied.contains(slot))
                .collect(),
        };

        let used_cpu_shares = containers
            .values()
            .map(|c| u64::from(c.manifest.cpu_shares))
            .sum();
        let used_memory = containers.values().map(|c| c.manifest.memory_limit).sum();

        debug!(
            containers = containers.len(),
            free_slots = free_slots.len(),
            used_cpu_shares,
            used_memory,
            "Ledger restored"
        );

        Ok(Self {
            allocator,
            host: config.advertise_host.clone(),
            cpu_total: u64::from(config.cpu_shares),
            memory_total: config.memory_limit,
            containers,
            free_slots,
            used_cpu_shares,
            used_memory,
        })
    }

    /// Reserve a slot and resources for `id`
    ///
    /// Checks run in a fixed order (slot capacity, ID uniqueness, CPU,
    /// memory) and the first failure is returned with no state changed.
    ///
    /// # Errors
    /// Returns [`Error::CapacityExceeded`], [`Error::DuplicateId`],
    /// [`Error::InsufficientCpu`] or [`Error::InsufficientMemory`].
    pub fn reserve(&mut self, id: ContainerId, manifest: Manifest) -> Result<Container> {
        let total = self.allocator.num_slots();
        if self.containers.len() >= usize::from(total) {
            return Err(Error::CapacityExceeded { total });
        }

        if self.containers.contains_key(&id) {
            return Err(Error::DuplicateId { id: id.into() });
        }

        let requested_cpu = u64::from(manifest.cpu_shares);
        if requested_cpu.saturating_add(self.used_cpu_shares) > self.cpu_total {
            return Err(Error::InsufficientCpu {
                requested: requested_cpu,
                available: self.cpu_total.saturating_sub(self.used_cpu_shares),
            });
        }

        if manifest.memory_limit.saturating_add(self.used_memory) > self.memory_total {
            return Err(Error::InsufficientMemory {
                requested: manifest.memory_limit,
                available: self.memory_total.saturating_sub(self.used_memory),
            });
        }

        // Fewer free slots than the count check implies only happens with
        // containers loaded from outside the current port range.
        let Some(slot) = self.free_slots.pop_front() else {
            return Err(Error::CapacityExceeded { total });
        };

        let ports = self.allocator.assign(slot);
        let container = Container {
            id: id.clone(),
            host: self.host.clone(),
            primary_port: ports.primary,
            ssh_port: ports.ssh,
            secondary_ports: ports.secondary,
            manifest,
        };

        self.used_cpu_shares += requested_cpu;
        self.used_memory += container.manifest.memory_limit;
        self.containers.insert(id, container.clone());

        Ok(container)
    }

    /// Remove `id`, returning its slot to the pool
    ///
    /// Returns `None` if `id` is not active.
    pub fn release(&mut self, id: &ContainerId) -> Option<Container> {
        let container = self.containers.remove(id)?;

        if let Some(slot) = self.slot_of(&container) {
            self.free_slots.push_back(slot);
        }
        self.used_cpu_shares = self
            .used_cpu_shares
            .saturating_sub(u64::from(container.manifest.cpu_shares));
        self.used_memory = self
            .used_memory
            .saturating_sub(container.manifest.memory_limit);

        Some(container)
    }

    /// Look up an active container
    #[must_use]
    pub fn get(&self, id: &ContainerId) -> Option<&Container> {
        self.containers.get(id)
    }

    /// Slot a container occupies
    #[must_use]
    pub fn slot_of(&self, container: &Container) -> Option<u16> {
        self.allocator.slot_of(container.primary_port)
    }

    /// Copy of every container plus the primary ports of free slots
    #[must_use]
    pub fn listing(&self) -> Listing {
        Listing {
            containers: self.containers.clone(),
            free_ports: self
                .free_slots
                .iter()
                .map(|slot| self.allocator.primary_port(*slot))
                .collect(),
        }
    }

    /// Total / used / free for slots, CPU shares and memory
    #[must_use]
    pub fn nums(&self) -> Nums {
        Nums {
            containers: ResourceStats::new(
                u64::from(self.allocator.num_slots()),
                self.containers.len() as u64,
            ),
            cpu_shares: ResourceStats::new(self.cpu_total, self.used_cpu_shares),
            memory: ResourceStats::new(self.memory_total, self.used_memory),
        }
    }

    /// Active containers by ID
    #[must_use]
    pub const fn containers(&self) -> &BTreeMap<ContainerId, Container> {
        &self.containers
    }

    /// Free slot indices in allocation order
    #[must_use]
    pub const fn free_slots(&self) -> &VecDeque<u16> {
        &self.free_slots
    }

    /// CPU shares held by active containers
    #[must_use]
    pub const fn used_cpu_shares(&self) -> u64 {
        self.used_cpu_shares
    }

    /// Memory in MB held by active containers
    #[must_use]
    pub const fn used_memory(&self) -> u64 {
        self.used_memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(containers: u16, cpu: u32, memory: u64) -> RegistryConfig {
        RegistryConfig::new("/tmp/berth")
            .with_min_port(1000)
            .with_containers(containers)
            .with_secondary_ports(2)
            .with_cpu_shares(cpu)
            .with_memory_limit(memory)
    }

    fn id(s: &str) -> ContainerId {
        ContainerId::new(s).unwrap()
    }

    fn assert_consistent(ledger: &Ledger) {
        let cpu: u64 = ledger
            .containers
            .values()
            .map(|c| u64::from(c.manifest.cpu_shares))
            .sum();
        let memory: u64 = ledger
            .containers
            .values()
            .map(|c| c.manifest.memory_limit)
            .sum();
        assert_eq!(cpu, ledger.used_cpu_shares);
        assert_eq!(memory, ledger.used_memory);
        assert!(ledger.used_cpu_shares <= ledger.cpu_total);
        assert!(ledger.used_memory <= ledger.memory_total);

        let mut slots: Vec<u16> = ledger
            .containers
            .values()
            .filter_map(|c| ledger.slot_of(c))
            .chain(ledger.free_slots.iter().copied())
            .collect();
        slots.sort_unstable();
        let expected: Vec<u16> = ledger.allocator.slots().collect();
        assert_eq!(slots, expected);
    }

    #[test]
    fn test_reserve_assigns_first_free_slot() {
        let mut ledger = Ledger::new(&config(4, 4, 1024)).unwrap();

        let web = ledger.reserve(id("web"), Manifest::new(1, 256)).unwrap();
        assert_eq!(web.primary_port, 1000);
        assert_eq!(web.ssh_port, 1004);
        assert_eq!(web.secondary_ports, vec![1008, 1012]);
        assert_eq!(web.host, "localhost");

        let db = ledger.reserve(id("db"), Manifest::new(1, 256)).unwrap();
        assert_eq!(db.primary_port, 1001);
        assert_consistent(&ledger);
    }

    #[test]
    fn test_capacity_exceeded_changes_nothing() {
        let mut ledger = Ledger::new(&config(2, 10, 1024)).unwrap();
        ledger.reserve(id("a"), Manifest::new(1, 1)).unwrap();
        ledger.reserve(id("b"), Manifest::new(1, 1)).unwrap();
        let before = ledger.nums();

        let err = ledger.reserve(id("c"), Manifest::new(1, 1)).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { total: 2 }));
        assert_eq!(ledger.nums(), before);
        assert_eq!(ledger.containers().len(), 2);
        assert_consistent(&ledger);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut ledger = Ledger::new(&config(4, 10, 1024)).unwrap();
        ledger.reserve(id("a"), Manifest::new(1, 1)).unwrap();

        let err = ledger.reserve(id("a"), Manifest::new(2, 2)).unwrap_err();
        assert!(matches!(err, Error::DuplicateId { ref id } if id == "a"));
        assert_eq!(ledger.get(&id("a")).unwrap().manifest.cpu_shares, 1);
    }

    #[test]
    fn test_insufficient_cpu_reports_available() {
        let mut ledger = Ledger::new(&config(4, 10, 1024)).unwrap();
        let first = ledger.reserve(id("a"), Manifest::new(6, 1)).unwrap();

        let err = ledger.reserve(id("b"), Manifest::new(5, 1)).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientCpu {
                requested: 5,
                available: 4
            }
        ));
        assert_eq!(ledger.get(&id("a")), Some(&first));
        assert_eq!(ledger.used_cpu_shares(), 6);
        assert_consistent(&ledger);
    }

    #[test]
    fn test_insufficient_memory() {
        let mut ledger = Ledger::new(&config(4, 10, 1024)).unwrap();
        ledger.reserve(id("a"), Manifest::new(1, 1000)).unwrap();

        let err = ledger.reserve(id("b"), Manifest::new(1, 100)).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientMemory {
                requested: 100,
                available: 24
            }
        ));
    }

    #[test]
    fn test_check_order() {
        // Full, duplicate, and short on CPU at once: capacity wins
        let mut ledger = Ledger::new(&config(1, 1, 1)).unwrap();
        ledger.reserve(id("a"), Manifest::new(1, 1)).unwrap();
        let err = ledger.reserve(id("a"), Manifest::new(5, 5)).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));

        // Duplicate and short on CPU: duplicate wins
        let mut ledger = Ledger::new(&config(2, 1, 1)).unwrap();
        ledger.reserve(id("a"), Manifest::new(1, 1)).unwrap();
        let err = ledger.reserve(id("a"), Manifest::new(5, 5)).unwrap_err();
        assert!(matches!(err, Error::DuplicateId { .. }));

        // Short on both: CPU wins
        let err = ledger.reserve(id("b"), Manifest::new(5, 5)).unwrap_err();
        assert!(matches!(err, Error::InsufficientCpu { .. }));
    }

    #[test]
    fn test_release_recycles_slot() {
        let mut ledger = Ledger::new(&config(2, 10, 1024)).unwrap();
        ledger.reserve(id("a"), Manifest::new(3, 100)).unwrap();
        ledger.reserve(id("b"), Manifest::new(2, 50)).unwrap();

        let released = ledger.release(&id("a")).unwrap();
        assert_eq!(released.primary_port, 1000);
        assert_eq!(ledger.used_cpu_shares(), 2);
        assert_eq!(ledger.used_memory(), 50);
        assert_eq!(ledger.free_slots(), &VecDeque::from([0]));

        let c = ledger.reserve(id("c"), Manifest::new(1, 1)).unwrap();
        assert_eq!(c.primary_port, 1000);
        assert_consistent(&ledger);
    }

    #[test]
    fn test_release_unknown_changes_nothing() {
        let mut ledger = Ledger::new(&config(2, 10, 1024)).unwrap();
        ledger.reserve(id("a"), Manifest::new(3, 100)).unwrap();
        let before_nums = ledger.nums();
        let before_pool = ledger.free_slots().clone();

        assert!(ledger.release(&id("missing")).is_none());
        assert_eq!(ledger.nums(), before_nums);
        assert_eq!(ledger.free_slots(), &before_pool);
    }

    #[test]
    fn test_listing_translates_slots_to_ports() {
        let mut ledger = Ledger::new(&config(4, 10, 1024)).unwrap();
        ledger.reserve(id("a"), Manifest::new(1, 1)).unwrap();

        let listing = ledger.listing();
        assert_eq!(listing.free_ports, vec![1001, 1002, 1003]);
        assert!(listing.containers.contains_key(&id("a")));
    }

    #[test]
    fn test_nums() {
        let mut ledger = Ledger::new(&config(4, 10, 1024)).unwrap();
        ledger.reserve(id("a"), Manifest::new(3, 256)).unwrap();

        let nums = ledger.nums();
        assert_eq!(nums.containers, ResourceStats::new(4, 1));
        assert_eq!(nums.cpu_shares, ResourceStats::new(10, 3));
        assert_eq!(nums.memory, ResourceStats::new(1024, 256));
    }

    #[test]
    fn test_mixed_sequence_keeps_invariants() {
        let mut ledger = Ledger::new(&config(3, 6, 600)).unwrap();
        let steps: [(&str, Option<(u32, u64)>); 9] = [
            ("a", Some((2, 200))),
            ("b", Some((2, 200))),
            ("c", Some((3, 100))),
            ("a", None),
            ("c", Some((3, 100))),
            ("d", Some((1, 300))),
            ("b", None),
            ("missing", None),
            ("d", Some((1, 100))),
        ];

        for (name, action) in steps {
            match action {
                Some((cpu, memory)) => {
                    let _ = ledger.reserve(id(name), Manifest::new(cpu, memory));
                }
                None => {
                    ledger.release(&id(name));
                }
            }
            assert_consistent(&ledger);
        }
    }

    #[test]
    fn test_restore_recomputes_counters() {
        let cfg = config(4, 10, 1024);
        let mut ledger = Ledger::new(&cfg).unwrap();
        ledger.reserve(id("a"), Manifest::new(3, 100)).unwrap();
        ledger.reserve(id("b"), Manifest::new(4, 200)).unwrap();

        let snapshot = Snapshot {
            containers: Some(ledger.containers().clone()),
            free_slots: Some(ledger.free_slots().iter().copied().collect()),
        };
        let restored = Ledger::restore(&cfg, snapshot).unwrap();

        assert_eq!(restored.used_cpu_shares(), 7);
        assert_eq!(restored.used_memory(), 300);
        assert_eq!(restored.free_slots(), ledger.free_slots());
        assert_eq!(restored.containers(), ledger.containers());
    }

    #[test]
    fn test_restore_without_ports_skips_occupied() {
        let cfg = config(4, 10, 1024);
        let mut ledger = Ledger::new(&cfg).unwrap();
        ledger.reserve(id("a"), Manifest::new(1, 1)).unwrap();

        let snapshot = Snapshot {
            containers: Some(ledger.containers().clone()),
            free_slots: None,
        };
        let restored = Ledger::restore(&cfg, snapshot).unwrap();
        assert_eq!(restored.free_slots(), &VecDeque::from([1, 2, 3]));
        assert_consistent(&restored);
    }

    #[test]
    fn test_restore_repairs_pool() {
        let cfg = config(4, 10, 1024);
        let mut ledger = Ledger::new(&cfg).unwrap();
        ledger.reserve(id("a"), Manifest::new(1, 1)).unwrap();

        // Occupied slot 0, duplicate 2, out-of-range 9; slot 1 missing
        let snapshot = Snapshot {
            containers: Some(ledger.containers().clone()),
            free_slots: Some(vec![3, 0, 2, 2, 9]),
        };
        let restored = Ledger::restore(&cfg, snapshot).unwrap();
        assert_eq!(restored.free_slots(), &VecDeque::from([3, 2, 1]));
        assert_consistent(&restored);
    }

    #[test]
    fn test_restore_drops_container_sharing_slot() {
        let cfg = config(4, 10, 1024);
        let mut ledger = Ledger::new(&cfg).unwrap();
        let a = ledger.reserve(id("a"), Manifest::new(2, 100)).unwrap();

        // "b" claims the same slot as "a"
        let mut containers = ledger.containers().clone();
        let mut b = a.clone();
        b.id = id("b");
        b.manifest = Manifest::new(3, 200);
        containers.insert(id("b"), b);

        let snapshot = Snapshot {
            containers: Some(containers),
            free_slots: Some(vec![1, 2, 3, 0]),
        };
        let mut restored = Ledger::restore(&cfg, snapshot).unwrap();

        assert_eq!(restored.containers().len(), 1);
        assert_eq!(restored.get(&id("a")), Some(&a));
        assert!(restored.get(&id("b")).is_none());
        assert_eq!(restored.used_cpu_shares(), 2);
        assert_eq!(restored.used_memory(), 100);
        assert_eq!(restored.free_slots(), &VecDeque::from([1, 2, 3]));
        assert_consistent(&restored);

        // Cycle every slot; no port is ever handed out twice
        restored.release(&id("a"));
        for name in ["x", "y", "z", "w"] {
            restored.reserve(id(name), Manifest::new(1, 1)).unwrap();
        }
        restored.release(&id("x"));
        let v = restored.reserve(id("v"), Manifest::new(1, 1)).unwrap();

        let primaries: BTreeSet<u16> = restored
            .containers()
            .values()
            .map(|c| c.primary_port)
            .collect();
        assert_eq!(primaries.len(), restored.containers().len());
        assert!(primaries.contains(&v.primary_port));
        assert_consistent(&restored);
    }
}
