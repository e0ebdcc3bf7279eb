use pregen_common::{Bounds, CellCoord, GenerationMode, RegionId};
use pregen_kernel::RegionHost;

/// Upper bound on the up-front allocation for an enumeration.
const MAX_PREALLOCATED_CELLS: u64 = 1 << 20;

/// Target area of a region for the given mode.
///
/// Spawn-centered areas read the region's spawn cell now, every call; returns
/// `None` if the spawn cannot be resolved.
pub fn region_bounds<H: RegionHost>(
    host: &H,
    region: RegionId,
    mode: GenerationMode,
) -> Option<Bounds> {
    let spawn = if mode.needs_spawn() {
        host.spawn_cell(region)?
    } else {
        CellCoord::ORIGIN
    };
    Some(mode.bounds(spawn))
}

/// Every cell of the region's target area, in queue order.
pub fn enumerate<H: RegionHost>(
    host: &H,
    region: RegionId,
    mode: GenerationMode,
) -> Option<Vec<CellCoord>> {
    region_bounds(host, region, mode).map(|bounds| cells_in(&bounds))
}

/// All cells of `bounds`, x ascending in the outer loop and z ascending in
/// the inner loop. Each cell appears exactly once.
pub fn cells_in(bounds: &Bounds) -> Vec<CellCoord> {
    let mut cells = Vec::with_capacity(bounds.cell_count().min(MAX_PREALLOCATED_CELLS) as usize);
    for x in bounds.start_x..=bounds.end_x {
        for z in bounds.start_z..=bounds.end_z {
            cells.push(CellCoord::new(x, z));
        }
    }
    cells
}
