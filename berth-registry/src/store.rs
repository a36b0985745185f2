//! Snapshot persistence
//!
//! Two objects live in the save directory: `containers` (ID to container
//! record) and `ports` (free slot indices in allocation order). Each is
//! written to a temp file, synced, then renamed over the old copy.

use berth_core::{Container, ContainerId, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the container map snapshot
pub const CONTAINERS_FILE: &str = "containers";

/// File name of the free slot pool snapshot
pub const PORTS_FILE: &str = "ports";

/// State read back from the save directory
///
/// `None` means the object was absent or unreadable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Saved container map
    pub containers: Option<BTreeMap<ContainerId, Container>>,

    /// Saved free slot pool
    pub free_slots: Option<Vec<u16>>,
}

/// Save directory handle
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open (creating if needed) a save directory
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened save directory");
        Ok(Self { dir })
    }

    /// Save directory path
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load both objects
    ///
    /// Read or decode failures are logged and reported as absent so the
    /// registry can still start.
    #[must_use]
    pub fn load(&self) -> Snapshot {
        Snapshot {
            containers: self.load_object(CONTAINERS_FILE),
            free_slots: self.load_object(PORTS_FILE),
        }
    }

    /// Persist the container map and free pool
    ///
    /// # Errors
    /// Returns error if either object cannot be encoded or written.
    pub fn save(
        &self,
        containers: &BTreeMap<ContainerId, Container>,
        free_slots: &VecDeque<u16>,
    ) -> Result<()> {
        self.write_object(CONTAINERS_FILE, containers)?;
        self.write_object(PORTS_FILE, free_slots)?;

        debug!(
            containers = containers.len(),
            free_slots = free_slots.len(),
            "Snapshot saved"
        );
        Ok(())
    }

    /// Read the persisted container map without a running registry
    ///
    /// Returns `Ok(None)` if nothing has been saved yet.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or decoded.
    pub fn read_containers(
        dir: impl AsRef<Path>,
    ) -> Result<Option<BTreeMap<ContainerId, Container>>> {
        read_file(&dir.as_ref().join(CONTAINERS_FILE))
    }

    fn load_object<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let path = self.dir.join(name);
        match read_file(&path) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                debug!(path = %path.display(), "No saved object");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not load saved object");
                None
            }
        }
    }

    fn write_object<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let temp_path = self.dir.join(format!("{name}.tmp"));

        let bytes = serde_json::to_vec(value)?;
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, &path)?;

        Ok(())
    }
}

fn read_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Ok(Some(serde_json::from_slice(&bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_core::Manifest;

    fn container(id: &str, port: u16) -> Container {
        Container {
            id: ContainerId::new(id).unwrap(),
            host: "localhost".to_string(),
            primary_port: port,
            ssh_port: port + 4,
            secondary_ports: vec![port + 8],
            manifest: Manifest::new(1, 64).with_label("team", "infra"),
        }
    }

    #[test]
    fn test_empty_dir_loads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        assert_eq!(store.load(), Snapshot::default());
        assert!(Store::read_containers(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_open_creates_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = Store::open(&nested).unwrap();

        assert!(nested.is_dir());
        assert_eq!(store.dir(), nested.as_path());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let mut containers = BTreeMap::new();
        for (id, port) in [("web", 1000), ("db", 1001)] {
            let c = container(id, port);
            containers.insert(c.id.clone(), c);
        }
        let free = VecDeque::from([3, 2]);

        store.save(&containers, &free).unwrap();

        let snapshot = store.load();
        assert_eq!(snapshot.containers.as_ref(), Some(&containers));
        assert_eq!(snapshot.free_slots, Some(vec![3, 2]));
        assert!(!dir.path().join("containers.tmp").exists());

        let direct = Store::read_containers(dir.path()).unwrap();
        assert_eq!(direct, Some(containers));
    }

    #[test]
    fn test_corrupt_object_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONTAINERS_FILE), b"not json").unwrap();
        fs::write(dir.path().join(PORTS_FILE), b"[1,0]").unwrap();

        let store = Store::open(dir.path()).unwrap();
        let snapshot = store.load();

        assert!(snapshot.containers.is_none());
        assert_eq!(snapshot.free_slots, Some(vec![1, 0]));
        assert!(Store::read_containers(dir.path()).is_err());
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();

        let c = container("web", 1000);
        let full = BTreeMap::from([(c.id.clone(), c)]);
        store.save(&full, &VecDeque::from([1])).unwrap();
        store
            .save(&BTreeMap::new(), &VecDeque::from([1, 0]))
            .unwrap();

        let snapshot = store.load();
        assert_eq!(snapshot.containers, Some(BTreeMap::new()));
        assert_eq!(snapshot.free_slots, Some(vec![1, 0]));
    }
}
