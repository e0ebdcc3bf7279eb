use pregen_common::{RegionId, ThrottleConfig};
use pregen_kernel::{RegionHost, TaskContext, TaskControl};

use crate::probe::{ExistenceProbe, ProbeError};
use crate::queue::WorkQueue;

/// Lifecycle of a region's drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Ticking; cells may remain.
    Scheduled,
    /// Queue emptied and completion reported. Terminal.
    Completed,
    /// Storage became unreachable; remaining cells are dropped. Terminal.
    Abandoned,
}

/// Cell counts for one tick or accumulated over a drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Cells taken off the queue.
    pub popped: usize,
    /// Cells handed to the generation pipeline.
    pub requested: usize,
    /// Cells skipped because they were already stored.
    pub skipped: usize,
}

impl DrainStats {
    fn absorb(&mut self, other: DrainStats) {
        self.popped += other.popped;
        self.requested += other.requested;
        self.skipped += other.skipped;
    }
}

/// What one drain tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Cells were popped; the queue may now be empty.
    Drained(DrainStats),
    /// The region is not loaded; nothing was popped.
    RegionUnavailable,
    /// The queue was empty; the drain is finished.
    Completed,
    /// The drain was given up; see [`DrainState::Abandoned`].
    Abandoned,
}

impl TickOutcome {
    /// Whether the drain is over and its task should be deregistered.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

/// Repeating unit of work draining one region's queue.
///
/// Each tick pops up to `max_concurrent` cells. Cells that already have a
/// stored record are dropped; the rest are requested from the host without
/// waiting for them. The tick after the queue runs dry reports completion.
#[derive(Debug)]
pub struct DrainScheduler {
    region: RegionId,
    name: String,
    queue: WorkQueue,
    throttle: ThrottleConfig,
    probe: ExistenceProbe,
    state: DrainState,
    totals: DrainStats,
    ticks: u64,
}

impl DrainScheduler {
    pub fn new(
        region: RegionId,
        name: impl Into<String>,
        queue: WorkQueue,
        throttle: ThrottleConfig,
    ) -> Self {
        Self {
            region,
            name: name.into(),
            queue,
            throttle,
            probe: ExistenceProbe::new(),
            state: DrainState::Scheduled,
            totals: DrainStats::default(),
            ticks: 0,
        }
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn throttle(&self) -> ThrottleConfig {
        self.throttle
    }

    /// Counts accumulated over every tick so far.
    pub fn totals(&self) -> DrainStats {
        self.totals
    }

    /// Number of ticks run, including no-op ticks.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run one drain step against the host.
    pub fn tick<H: RegionHost>(&mut self, host: &mut H) -> TickOutcome {
        match self.state {
            DrainState::Completed => return TickOutcome::Completed,
            DrainState::Abandoned => return TickOutcome::Abandoned,
            DrainState::Scheduled => {}
        }
        self.ticks += 1;

        if self.queue.is_empty() {
            self.state = DrainState::Completed;
            tracing::info!(
                region = %self.name,
                requested = self.totals.requested,
                skipped = self.totals.skipped,
                "finished pre-generating chunks for world {}",
                self.name
            );
            return TickOutcome::Completed;
        }

        if !host.is_loaded(self.region) {
            tracing::trace!(region = %self.name, "region not loaded, skipping tick");
            return TickOutcome::RegionUnavailable;
        }

        let _span = tracing::info_span!("drain_tick", region = %self.name).entered();
        let mut stats = DrainStats::default();

        for _ in 0..self.throttle.max_concurrent.get() {
            let Some(coord) = self.queue.pop() else {
                break;
            };
            stats.popped += 1;

            match self.probe.exists(host, self.region, coord) {
                Ok(true) => {
                    tracing::trace!(%coord, "already generated");
                    stats.skipped += 1;
                }
                Ok(false) => {
                    host.request_generation(self.region, coord);
                    stats.requested += 1;
                }
                Err(e @ ProbeError::Lookup { .. }) => {
                    tracing::warn!(%coord, error = %e, "chunk lookup failed, leaving it alone");
                    stats.skipped += 1;
                }
                Err(e @ ProbeError::StorageUnavailable(_)) => {
                    tracing::error!(
                        region = %self.name,
                        remaining = self.queue.len(),
                        error = %e,
                        "storage unavailable, abandoning region"
                    );
                    self.totals.absorb(stats);
                    self.state = DrainState::Abandoned;
                    return TickOutcome::Abandoned;
                }
            }
        }

        self.totals.absorb(stats);
        tracing::debug!(
            popped = stats.popped,
            requested = stats.requested,
            skipped = stats.skipped,
            remaining = self.queue.len(),
            total = self.queue.total(),
            "drain tick complete"
        );
        TickOutcome::Drained(stats)
    }

    /// Scheduler entry point: one tick, cancelling the task once terminal.
    pub fn run<H: RegionHost + 'static>(&mut self, cx: &mut TaskContext<'_, H>) -> TaskControl {
        if self.tick(cx.host_mut()).is_terminal() {
            TaskControl::Cancel
        } else {
            TaskControl::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::cells_in;
    use pregen_common::{Bounds, CellCoord, GenerationMode};
    use pregen_kernel::{Scheduler, Server};
    use pregen_persist::{ChunkDataKey, KeyValueStore, MemoryStore, StoreError, chunk_key};
    use std::num::NonZeroUsize;
    use std::rc::Rc;

    fn throttle(max: usize) -> ThrottleConfig {
        ThrottleConfig::new(NonZeroUsize::new(max).unwrap())
    }

    fn world() -> (Server, RegionId, Rc<MemoryStore>) {
        let mut server = Server::default();
        let store = Rc::new(MemoryStore::new());
        let id = server
            .add_region("world", CellCoord::ORIGIN, store.clone())
            .unwrap();
        (server, id, store)
    }

    fn fixed_queue(x: u32, z: u32) -> WorkQueue {
        let bounds = GenerationMode::FixedExtent {
            x_radius: x,
            z_radius: z,
        }
        .bounds(CellCoord::ORIGIN);
        WorkQueue::new(cells_in(&bounds))
    }

    fn requested(server: &Server) -> Vec<(i32, i32)> {
        server.requests().iter().map(|(_, c)| (c.x, c.z)).collect()
    }

    #[test]
    fn three_by_three_drains_in_three_ticks() {
        let (mut server, id, _) = world();
        let mut drain = DrainScheduler::new(id, "world", fixed_queue(2, 2), throttle(3));
        assert_eq!(drain.queue().len(), 9);

        assert!(matches!(drain.tick(&mut server), TickOutcome::Drained(s) if s.popped == 3));
        assert_eq!(requested(&server), vec![(-1, -1), (-1, 0), (-1, 1)]);

        drain.tick(&mut server);
        assert_eq!(requested(&server)[3..], [(0, -1), (0, 0), (0, 1)]);

        drain.tick(&mut server);
        assert_eq!(requested(&server)[6..], [(1, -1), (1, 0), (1, 1)]);
        assert!(drain.queue().is_empty());
        assert_eq!(drain.state(), DrainState::Scheduled);

        assert_eq!(drain.tick(&mut server), TickOutcome::Completed);
        assert_eq!(drain.state(), DrainState::Completed);
        assert_eq!(server.requests().len(), 9);
        assert_eq!(drain.ticks(), 4);
    }

    #[test]
    fn queue_shrinks_by_budget_each_tick() {
        let (mut server, id, _) = world();
        let mut drain = DrainScheduler::new(id, "world", fixed_queue(6, 4), throttle(4));
        let mut before = drain.queue().len();
        assert_eq!(before, 35);

        while !drain.queue().is_empty() {
            drain.tick(&mut server);
            let after = drain.queue().len();
            assert_eq!(after, before.saturating_sub(4));
            before = after;
        }
        assert_eq!(drain.totals().popped, 35);
    }

    #[test]
    fn existing_cells_are_popped_but_not_requested() {
        let (mut server, id, store) = world();
        store
            .put(&chunk_key(CellCoord::new(-1, 0), ChunkDataKey::NewVersion), &[40])
            .unwrap();
        store
            .put(&chunk_key(CellCoord::new(-1, 1), ChunkDataKey::OldVersion), &[7])
            .unwrap();

        let mut drain = DrainScheduler::new(id, "world", fixed_queue(2, 2), throttle(3));
        let outcome = drain.tick(&mut server);

        assert_eq!(
            outcome,
            TickOutcome::Drained(DrainStats {
                popped: 3,
                requested: 1,
                skipped: 2
            })
        );
        assert_eq!(requested(&server), vec![(-1, -1)]);
        assert_eq!(drain.queue().len(), 6);
    }

    #[test]
    fn unloaded_region_is_a_silent_no_op() {
        let (mut server, id, _) = world();
        let mut drain = DrainScheduler::new(id, "world", fixed_queue(2, 2), throttle(3));
        server.unload(id).unwrap();

        assert_eq!(drain.tick(&mut server), TickOutcome::RegionUnavailable);
        assert_eq!(drain.queue().len(), 9);
        assert_eq!(drain.state(), DrainState::Scheduled);
        assert!(server.requests().is_empty());

        server.load(id).unwrap();
        assert!(matches!(drain.tick(&mut server), TickOutcome::Drained(_)));
        assert_eq!(drain.queue().len(), 6);
    }

    #[test]
    fn empty_queue_completes_on_first_tick() {
        let (mut server, id, _) = world();
        let mut drain = DrainScheduler::new(id, "world", WorkQueue::default(), throttle(1));
        server.unload(id).unwrap();
        assert_eq!(drain.tick(&mut server), TickOutcome::Completed);
        assert_eq!(drain.tick(&mut server), TickOutcome::Completed);
        assert_eq!(drain.ticks(), 1);
    }

    #[test]
    fn storage_loss_abandons_the_region() {
        let mut server = Server::default();
        let id = server
            .add_opaque_region("legacy", CellCoord::ORIGIN, "anvil")
            .unwrap();
        let mut drain = DrainScheduler::new(id, "legacy", fixed_queue(2, 2), throttle(3));

        assert_eq!(drain.tick(&mut server), TickOutcome::Abandoned);
        assert_eq!(drain.state(), DrainState::Abandoned);
        assert!(server.requests().is_empty());
        assert_eq!(drain.tick(&mut server), TickOutcome::Abandoned);
    }

    /// Store whose reads always fail.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
            Err(std::io::Error::other("read failed").into())
        }

        fn put(&self, _key: &[u8], _value: &[u8]) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[test]
    fn failed_lookups_count_as_present() {
        let mut server = Server::default();
        let id = server
            .add_region("world", CellCoord::ORIGIN, Rc::new(BrokenStore))
            .unwrap();
        let queue = WorkQueue::new(vec![CellCoord::new(0, 0), CellCoord::new(0, 1)]);
        let mut drain = DrainScheduler::new(id, "world", queue, throttle(3));

        assert_eq!(
            drain.tick(&mut server),
            TickOutcome::Drained(DrainStats {
                popped: 2,
                requested: 0,
                skipped: 2
            })
        );
        assert!(server.requests().is_empty());
        assert_eq!(drain.state(), DrainState::Scheduled);

        assert_eq!(drain.tick(&mut server), TickOutcome::Completed);
        assert_eq!(drain.totals().skipped, 2);
    }

    #[test]
    fn partial_last_batch() {
        let (mut server, id, _) = world();
        let queue = WorkQueue::new(cells_in(&Bounds::around(CellCoord::ORIGIN, 0, 2)));
        let mut drain = DrainScheduler::new(id, "world", queue, throttle(4));

        drain.tick(&mut server);
        assert_eq!(drain.queue().len(), 1);
        assert!(matches!(drain.tick(&mut server), TickOutcome::Drained(s) if s.popped == 1));
        assert_eq!(drain.totals().requested, 5);
    }

    #[test]
    fn task_cancels_exactly_once() {
        let (mut server, id, _) = world();
        let mut scheduler = Scheduler::new();
        let mut drain = DrainScheduler::new(id, "world", fixed_queue(2, 2), throttle(3));

        let task = scheduler.with_context(&mut server, |cx| {
            cx.schedule_repeating(1, move |cx| drain.run(cx))
        });

        let mut retired = Vec::new();
        let mut runs = 0;
        for _ in 0..10 {
            let summary = scheduler.tick(&mut server);
            runs += summary.ran;
            retired.extend(summary.retired);
        }

        assert_eq!(runs, 4);
        assert_eq!(retired, vec![task]);
        assert!(scheduler.is_idle());
        assert_eq!(server.requests().len(), 9);
    }
}
