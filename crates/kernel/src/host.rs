use pregen_common::{CellCoord, RegionId};
use pregen_persist::StorageHandle;

/// What pre-generation needs from the process hosting the regions.
///
/// Resolution is by name at setup and by identifier afterwards; a region that
/// was unloaded resolves to nothing until it comes back.
pub trait RegionHost {
    /// Look up a loaded region by name.
    fn resolve_region(&self, name: &str) -> Option<RegionId>;

    /// Whether the region is currently loaded.
    fn is_loaded(&self, id: RegionId) -> bool;

    /// Display name of a known region, loaded or not.
    fn region_name(&self, id: RegionId) -> Option<&str>;

    /// Current spawn cell of a loaded region.
    fn spawn_cell(&self, id: RegionId) -> Option<CellCoord>;

    /// Ask the generation pipeline to materialize a cell.
    ///
    /// Fire-and-forget and idempotent: requesting an existing or already
    /// queued cell is harmless.
    fn request_generation(&mut self, id: RegionId, coord: CellCoord);

    /// Key-value access into the region's storage, if its backend offers it.
    fn storage(&self, id: RegionId) -> Option<StorageHandle>;

    /// Epoch of the region's live storage instance.
    fn storage_epoch(&self, id: RegionId) -> Option<u64> {
        self.storage(id).map(|handle| handle.epoch())
    }

    /// Whether the region's backend can answer existence checks.
    fn is_compatible_backend(&self, id: RegionId) -> bool {
        self.storage(id).is_some()
    }
}
