use std::fmt;

use pregen_common::{Bounds, RegionId};
use pregen_config::PregenConfig;
use pregen_kernel::{RegionHost, TaskContext, TaskId};

use crate::drain::DrainScheduler;
use crate::grid::{cells_in, region_bounds};
use crate::queue::WorkQueue;

/// Why a configured region was not scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No loaded region has this name.
    NotLoaded,
    /// The region's storage cannot answer existence checks.
    IncompatibleBackend,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotLoaded => "world is not loaded",
            Self::IncompatibleBackend => "unknown world provider",
        })
    }
}

/// A region whose drain task was registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRegion {
    pub region: RegionId,
    pub name: String,
    pub bounds: Bounds,
    /// Cells queued.
    pub total: usize,
    pub task: TaskId,
}

/// Result of the setup pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetupReport {
    pub scheduled: Vec<ScheduledRegion>,
    pub skipped: Vec<(String, SkipReason)>,
}

impl SetupReport {
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty() && self.skipped.is_empty()
    }

    /// Cells queued across all scheduled regions.
    pub fn total_cells(&self) -> usize {
        self.scheduled.iter().map(|r| r.total).sum()
    }
}

/// Resolve every configured region, enumerate its area and register one
/// repeating drain task per region.
///
/// Regions that are not loaded or whose backend cannot be probed are skipped
/// and logged; the others proceed.
pub fn schedule_regions<H: RegionHost + 'static>(
    cx: &mut TaskContext<'_, H>,
    config: &PregenConfig,
) -> SetupReport {
    let mut report = SetupReport::default();
    if config.worlds.is_empty() {
        tracing::info!("no worlds are specified in the configuration");
        return report;
    }

    tracing::info!("starting pre-generation of chunks");
    for name in &config.worlds {
        match schedule_region(cx, name, config) {
            Ok(scheduled) => {
                tracing::info!(
                    region = %scheduled.name,
                    bounds = %scheduled.bounds,
                    cells = scheduled.total,
                    "queued world for pre-generation"
                );
                report.scheduled.push(scheduled);
            }
            Err(SkipReason::NotLoaded) => {
                tracing::warn!(
                    "unable to pre-generate chunks for world {name}, the world has not been loaded"
                );
                report.skipped.push((name.clone(), SkipReason::NotLoaded));
            }
            Err(SkipReason::IncompatibleBackend) => {
                tracing::warn!("unknown world provider for world {name}, skipping");
                report
                    .skipped
                    .push((name.clone(), SkipReason::IncompatibleBackend));
            }
        }
    }
    report
}

fn schedule_region<H: RegionHost + 'static>(
    cx: &mut TaskContext<'_, H>,
    name: &str,
    config: &PregenConfig,
) -> Result<ScheduledRegion, SkipReason> {
    let host = cx.host();
    let region = host.resolve_region(name).ok_or(SkipReason::NotLoaded)?;
    if !host.is_compatible_backend(region) {
        return Err(SkipReason::IncompatibleBackend);
    }
    let bounds = region_bounds(host, region, config.mode).ok_or(SkipReason::NotLoaded)?;

    let queue = WorkQueue::new(cells_in(&bounds));
    let total = queue.total();
    let mut drain = DrainScheduler::new(region, name, queue, config.throttle);
    let task = cx.schedule_repeating(config.throttle.period.get(), move |cx| drain.run(cx));

    Ok(ScheduledRegion {
        region,
        name: name.to_string(),
        bounds,
        total,
        task,
    })
}

/// Register the setup pass to run on the next tick, handing its report to
/// `on_done`.
pub fn schedule_setup<H: RegionHost + 'static>(
    cx: &mut TaskContext<'_, H>,
    config: PregenConfig,
    on_done: impl FnOnce(SetupReport) + 'static,
) -> TaskId {
    cx.schedule_once(0, move |cx| on_done(schedule_regions(cx, &config)))
}
