//! Pre-generation: enumerate a region's target area, then drain it a few
//! cells per tick into the host's generation pipeline.
//!
//! # Invariants
//! - A region's queue only shrinks after enumeration, strictly FIFO.
//! - At most `max_concurrent` cells leave a queue per drain tick, whether
//!   they are generated or skipped.
//! - A cell that already has a stored version record is never requested.
//! - Each region's drain task cancels itself exactly once.

mod drain;
mod grid;
mod probe;
mod queue;
mod setup;

pub use drain::{DrainScheduler, DrainState, DrainStats, TickOutcome};
pub use grid::{cells_in, enumerate, region_bounds};
pub use probe::{ExistenceProbe, ProbeError};
pub use queue::WorkQueue;
pub use setup::{ScheduledRegion, SetupReport, SkipReason, schedule_regions, schedule_setup};

pub fn crate_info() -> &'static str {
    "pregen-stream v0.1.0"
}
