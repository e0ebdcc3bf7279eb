use std::collections::{BTreeMap, HashSet, VecDeque};
use std::rc::Rc;

use pregen_common::{CellCoord, RegionId};
use pregen_persist::{ChunkDataKey, KeyValueStore, StorageHandle, chunk_key};

use crate::host::RegionHost;

/// Version byte written into the version record of every generated chunk.
pub const CHUNK_FORMAT_VERSION: u8 = 40;

/// Errors from host-side region management.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("region '{0}' already exists")]
    DuplicateRegion(String),
    #[error("region {0} not found")]
    RegionNotFound(RegionId),
}

/// Storage backend of a region.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Key-value storage that exposes existence checks.
    KeyValue(StorageHandle),
    /// A backend that offers no key-value access, named by its format.
    Opaque(String),
}

#[derive(Debug)]
struct RegionEntry {
    name: String,
    spawn: CellCoord,
    loaded: bool,
    backend: Backend,
}

/// In-process host: named regions plus a generation pipeline.
///
/// Generation requests are queued, deduplicated, and materialized on
/// [`Server::step`], at most `generation_budget` cells per step. A generated
/// cell is a version record under the current-format key.
#[derive(Debug)]
pub struct Server {
    regions: BTreeMap<RegionId, RegionEntry>,
    next_region: u32,
    next_epoch: u64,
    generation_budget: usize,
    queued: VecDeque<(RegionId, CellCoord)>,
    in_flight: HashSet<(RegionId, CellCoord)>,
    requests: Vec<(RegionId, CellCoord)>,
    generated: usize,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Server {
    /// Create a host whose pipeline materializes up to `generation_budget` cells per step.
    pub fn new(generation_budget: usize) -> Self {
        Self {
            regions: BTreeMap::new(),
            next_region: 0,
            next_epoch: 1,
            generation_budget: generation_budget.max(1),
            queued: VecDeque::new(),
            in_flight: HashSet::new(),
            requests: Vec::new(),
            generated: 0,
        }
    }

    /// Add a loaded region backed by a key-value store.
    pub fn add_region(
        &mut self,
        name: impl Into<String>,
        spawn: CellCoord,
        store: Rc<dyn KeyValueStore>,
    ) -> Result<RegionId, HostError> {
        let handle = StorageHandle::new(self.bump_epoch(), store);
        self.insert_region(name.into(), spawn, Backend::KeyValue(handle))
    }

    /// Add a loaded region whose backend cannot answer existence checks.
    pub fn add_opaque_region(
        &mut self,
        name: impl Into<String>,
        spawn: CellCoord,
        format: impl Into<String>,
    ) -> Result<RegionId, HostError> {
        self.insert_region(name.into(), spawn, Backend::Opaque(format.into()))
    }

    fn insert_region(
        &mut self,
        name: String,
        spawn: CellCoord,
        backend: Backend,
    ) -> Result<RegionId, HostError> {
        if self.regions.values().any(|r| r.name == name) {
            return Err(HostError::DuplicateRegion(name));
        }
        let id = RegionId(self.next_region);
        self.next_region += 1;
        tracing::debug!(%id, %name, %spawn, "region added");
        self.regions.insert(
            id,
            RegionEntry {
                name,
                spawn,
                loaded: true,
                backend,
            },
        );
        Ok(id)
    }

    fn bump_epoch(&mut self) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        epoch
    }

    fn entry_mut(&mut self, id: RegionId) -> Result<&mut RegionEntry, HostError> {
        self.regions.get_mut(&id).ok_or(HostError::RegionNotFound(id))
    }

    /// Mark a region unloaded. It keeps its id and storage but stops resolving.
    pub fn unload(&mut self, id: RegionId) -> Result<(), HostError> {
        self.entry_mut(id)?.loaded = false;
        Ok(())
    }

    /// Mark a previously unloaded region loaded again.
    pub fn load(&mut self, id: RegionId) -> Result<(), HostError> {
        self.entry_mut(id)?.loaded = true;
        Ok(())
    }

    /// Replace a region's storage instance. Returns the new epoch.
    pub fn reload_storage(
        &mut self,
        id: RegionId,
        store: Rc<dyn KeyValueStore>,
    ) -> Result<u64, HostError> {
        let epoch = self.bump_epoch();
        self.entry_mut(id)?.backend = Backend::KeyValue(StorageHandle::new(epoch, store));
        tracing::debug!(%id, epoch, "region storage reloaded");
        Ok(epoch)
    }

    pub fn set_spawn(&mut self, id: RegionId, spawn: CellCoord) -> Result<(), HostError> {
        self.entry_mut(id)?.spawn = spawn;
        Ok(())
    }

    pub fn backend(&self, id: RegionId) -> Option<&Backend> {
        self.regions.get(&id).map(|r| &r.backend)
    }

    /// Every generation request received, in arrival order.
    pub fn requests(&self) -> &[(RegionId, CellCoord)] {
        &self.requests
    }

    /// Requests not yet materialized.
    pub fn pending_generation(&self) -> usize {
        self.queued.len()
    }

    /// Total cells materialized so far.
    pub fn generated(&self) -> usize {
        self.generated
    }

    /// Run the generation pipeline once. Returns the number of cells materialized.
    ///
    /// Requests for unloaded regions stay queued until the region is loaded.
    pub fn step(&mut self) -> usize {
        let mut done = 0;
        let mut deferred = VecDeque::new();

        while done < self.generation_budget {
            let Some((id, coord)) = self.queued.pop_front() else {
                break;
            };
            let Some(region) = self.regions.get(&id) else {
                self.in_flight.remove(&(id, coord));
                continue;
            };
            if !region.loaded {
                deferred.push_back((id, coord));
                continue;
            }
            self.in_flight.remove(&(id, coord));

            if let Backend::KeyValue(handle) = &region.backend {
                let key = chunk_key(coord, ChunkDataKey::NewVersion);
                if let Err(e) = handle.store().put(&key, &[CHUNK_FORMAT_VERSION]) {
                    tracing::error!(region = %region.name, %coord, "failed to save chunk: {e}");
                    continue;
                }
            }
            tracing::trace!(region = %region.name, %coord, "chunk generated");
            done += 1;
        }

        deferred.append(&mut self.queued);
        self.queued = deferred;
        self.generated += done;
        done
    }
}

impl RegionHost for Server {
    fn resolve_region(&self, name: &str) -> Option<RegionId> {
        self.regions
            .iter()
            .find(|(_, r)| r.loaded && r.name == name)
            .map(|(id, _)| *id)
    }

    fn is_loaded(&self, id: RegionId) -> bool {
        self.regions.get(&id).is_some_and(|r| r.loaded)
    }

    fn region_name(&self, id: RegionId) -> Option<&str> {
        self.regions.get(&id).map(|r| r.name.as_str())
    }

    fn spawn_cell(&self, id: RegionId) -> Option<CellCoord> {
        self.regions
            .get(&id)
            .filter(|r| r.loaded)
            .map(|r| r.spawn)
    }

    fn request_generation(&mut self, id: RegionId, coord: CellCoord) {
        self.requests.push((id, coord));
        if self.in_flight.insert((id, coord)) {
            self.queued.push_back((id, coord));
        }
    }

    fn storage(&self, id: RegionId) -> Option<StorageHandle> {
        match &self.regions.get(&id)?.backend {
            Backend::KeyValue(handle) => Some(handle.clone()),
            Backend::Opaque(_) => None,
        }
    }
}
