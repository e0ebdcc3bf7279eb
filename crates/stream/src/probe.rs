use std::collections::HashMap;

use pregen_common::{CellCoord, RegionId};
use pregen_kernel::RegionHost;
use pregen_persist::{ChunkDataKey, StorageHandle, StoreError, chunk_key};

/// Errors from existence checks.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// The region's storage offers no key-value access. Regions are checked
    /// for this at setup, so hitting it later is a broken invariant.
    #[error("region {0} has no key-value storage")]
    StorageUnavailable(RegionId),
    #[error("lookup of {coord} in region {region} failed: {source}")]
    Lookup {
        region: RegionId,
        coord: CellCoord,
        #[source]
        source: StoreError,
    },
}

/// Answers "is this cell already stored" without generating it.
///
/// The storage handle of each region is acquired on first use and cached.
/// When the host reports a different storage epoch for a region (its storage
/// was reloaded), the cached handle is dropped and acquired again. When it
/// reports no storage at all, the handle is dropped and the lookup fails.
#[derive(Debug, Default)]
pub struct ExistenceProbe {
    handles: HashMap<RegionId, StorageHandle>,
    acquisitions: usize,
}

impl ExistenceProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a version record exists for `coord`, in the current format or
    /// the legacy one.
    pub fn exists<H: RegionHost>(
        &mut self,
        host: &H,
        region: RegionId,
        coord: CellCoord,
    ) -> Result<bool, ProbeError> {
        let handle = self.handle(host, region)?;
        for tag in ChunkDataKey::VERSION_TAGS {
            let found = handle
                .store()
                .contains(&chunk_key(coord, tag))
                .map_err(|source| ProbeError::Lookup {
                    region,
                    coord,
                    source,
                })?;
            if found {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn handle<H: RegionHost>(
        &mut self,
        host: &H,
        region: RegionId,
    ) -> Result<&StorageHandle, ProbeError> {
        let cached_epoch = self.handles.get(&region).map(StorageHandle::epoch);
        let needs_acquire = match (cached_epoch, host.storage_epoch(region)) {
            (None, _) => true,
            (Some(cached), Some(live)) => cached != live,
            (Some(_), None) => {
                self.handles.remove(&region);
                tracing::debug!(%region, "storage went away, cached handle dropped");
                return Err(ProbeError::StorageUnavailable(region));
            }
        };

        if needs_acquire {
            let handle = host
                .storage(region)
                .ok_or(ProbeError::StorageUnavailable(region))?;
            tracing::debug!(%region, epoch = handle.epoch(), "storage handle acquired");
            self.handles.insert(region, handle);
            self.acquisitions += 1;
        }

        self.handles
            .get(&region)
            .ok_or(ProbeError::StorageUnavailable(region))
    }

    /// Whether a handle for `region` is cached.
    pub fn is_cached(&self, region: RegionId) -> bool {
        self.handles.contains_key(&region)
    }

    /// How many times a handle was acquired from the host.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions
    }

    /// Drop the cached handle of a region.
    pub fn forget(&mut self, region: RegionId) {
        self.handles.remove(&region);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pregen_kernel::Server;
    use pregen_persist::{KeyValueStore, MemoryStore};
    use std::rc::Rc;

    fn setup() -> (Server, RegionId, Rc<MemoryStore>) {
        let mut server = Server::default();
        let store = Rc::new(MemoryStore::new());
        let id = server
            .add_region("world", CellCoord::ORIGIN, store.clone())
            .unwrap();
        (server, id, store)
    }

    #[test]
    fn missing_cell_does_not_exist() {
        let (server, id, store) = setup();
        let mut probe = ExistenceProbe::new();
        assert!(!probe.exists(&server, id, CellCoord::new(4, 4)).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn current_format_record_is_found() {
        let (server, id, store) = setup();
        let coord = CellCoord::new(-2, 9);
        store
            .put(&chunk_key(coord, ChunkDataKey::NewVersion), &[40])
            .unwrap();

        let mut probe = ExistenceProbe::new();
        assert!(probe.exists(&server, id, coord).unwrap());
        assert!(!probe.exists(&server, id, CellCoord::new(9, -2)).unwrap());
    }

    #[test]
    fn legacy_format_record_is_found() {
        let (server, id, store) = setup();
        let coord = CellCoord::new(1, 1);
        store
            .put(&chunk_key(coord, ChunkDataKey::OldVersion), &[7])
            .unwrap();

        let mut probe = ExistenceProbe::new();
        assert!(probe.exists(&server, id, coord).unwrap());
    }

    #[test]
    fn other_tags_do_not_count() {
        let (server, id, store) = setup();
        let coord = CellCoord::new(0, 0);
        let mut key = chunk_key(coord, ChunkDataKey::NewVersion);
        key[8] = 0x2f;
        store.put(&key, &[1]).unwrap();

        let mut probe = ExistenceProbe::new();
        assert!(!probe.exists(&server, id, coord).unwrap());
    }

    #[test]
    fn handle_is_acquired_once() {
        let (server, id, _) = setup();
        let mut probe = ExistenceProbe::new();
        assert!(!probe.is_cached(id));
        for z in 0..10 {
            probe.exists(&server, id, CellCoord::new(0, z)).unwrap();
        }
        assert!(probe.is_cached(id));
        assert_eq!(probe.acquisitions(), 1);

        probe.forget(id);
        assert!(!probe.is_cached(id));
    }

    #[test]
    fn reloaded_storage_is_reacquired() {
        let (mut server, id, old_store) = setup();
        let coord = CellCoord::new(3, 3);
        old_store
            .put(&chunk_key(coord, ChunkDataKey::NewVersion), &[40])
            .unwrap();

        let mut probe = ExistenceProbe::new();
        assert!(probe.exists(&server, id, coord).unwrap());

        server.reload_storage(id, Rc::new(MemoryStore::new())).unwrap();
        assert!(!probe.exists(&server, id, coord).unwrap());
        assert_eq!(probe.acquisitions(), 2);
    }

    /// Host whose storage can be withdrawn after the fact.
    struct DetachableHost {
        store: Rc<MemoryStore>,
        attached: bool,
        requested: Vec<CellCoord>,
    }

    impl RegionHost for DetachableHost {
        fn resolve_region(&self, name: &str) -> Option<RegionId> {
            (name == "world").then_some(RegionId(0))
        }

        fn is_loaded(&self, _id: RegionId) -> bool {
            true
        }

        fn region_name(&self, _id: RegionId) -> Option<&str> {
            Some("world")
        }

        fn spawn_cell(&self, _id: RegionId) -> Option<CellCoord> {
            Some(CellCoord::ORIGIN)
        }

        fn request_generation(&mut self, _id: RegionId, coord: CellCoord) {
            self.requested.push(coord);
        }

        fn storage(&self, _id: RegionId) -> Option<StorageHandle> {
            self.attached
                .then(|| StorageHandle::new(1, self.store.clone()))
        }
    }

    #[test]
    fn withdrawn_storage_drops_cached_handle() {
        let mut host = DetachableHost {
            store: Rc::new(MemoryStore::new()),
            attached: true,
            requested: Vec::new(),
        };
        let id = RegionId(0);
        let mut probe = ExistenceProbe::new();
        assert!(!probe.exists(&host, id, CellCoord::new(1, 1)).unwrap());
        assert!(probe.is_cached(id));

        host.attached = false;
        let err = probe.exists(&host, id, CellCoord::new(1, 2)).unwrap_err();
        assert!(matches!(err, ProbeError::StorageUnavailable(r) if r == id));
        assert!(!probe.is_cached(id));

        host.attached = true;
        assert!(!probe.exists(&host, id, CellCoord::new(1, 2)).unwrap());
        assert_eq!(probe.acquisitions(), 2);
    }

    #[test]
    fn opaque_backend_fails_closed() {
        let mut server = Server::default();
        let id = server
            .add_opaque_region("legacy", CellCoord::ORIGIN, "anvil")
            .unwrap();
        let mut probe = ExistenceProbe::new();
        let err = probe.exists(&server, id, CellCoord::ORIGIN).unwrap_err();
        assert!(matches!(err, ProbeError::StorageUnavailable(r) if r == id));
        assert_eq!(probe.acquisitions(), 0);
    }
}
