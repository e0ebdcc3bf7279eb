use std::fmt;

/// Identifier of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What a task asks the scheduler to do after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    /// Keep a repeating task registered. One-shot tasks retire regardless.
    Continue,
    /// Deregister the task; it never runs again.
    Cancel,
}

type TaskFn<C> = Box<dyn FnMut(&mut TaskContext<'_, C>) -> TaskControl>;

struct ScheduledTask<C> {
    id: TaskId,
    next_run: u64,
    period: Option<u64>,
    run: TaskFn<C>,
}

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// The tick that was run.
    pub tick: u64,
    /// Number of task invocations.
    pub ran: usize,
    /// Tasks deregistered during this tick, in run order.
    pub retired: Vec<TaskId>,
}

/// Access handed to a running task: the host, the clock, and registration.
///
/// Tasks registered through a context are queued and first become eligible
/// on a later tick.
pub struct TaskContext<'a, C> {
    host: &'a mut C,
    tick: u64,
    task: Option<TaskId>,
    next_id: &'a mut u64,
    pending: &'a mut Vec<ScheduledTask<C>>,
}

impl<C: 'static> TaskContext<'_, C> {
    pub fn host(&self) -> &C {
        &*self.host
    }

    pub fn host_mut(&mut self) -> &mut C {
        &mut *self.host
    }

    /// Tick currently being run (0 before the first tick).
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// The task being run, or `None` outside of a task.
    pub fn current_task(&self) -> Option<TaskId> {
        self.task
    }

    /// Run `task` once, `delay` ticks from now (at least one).
    pub fn schedule_once(
        &mut self,
        delay: u64,
        task: impl FnOnce(&mut TaskContext<'_, C>) + 'static,
    ) -> TaskId {
        let mut task = Some(task);
        self.register(delay.max(1), None, move |cx| {
            if let Some(task) = task.take() {
                task(cx);
            }
            TaskControl::Cancel
        })
    }

    /// Run `task` on the next tick and then every `period` ticks until it
    /// returns [`TaskControl::Cancel`].
    pub fn schedule_repeating(
        &mut self,
        period: u64,
        task: impl FnMut(&mut TaskContext<'_, C>) -> TaskControl + 'static,
    ) -> TaskId {
        self.register(1, Some(period.max(1)), task)
    }

    fn register(
        &mut self,
        delay: u64,
        period: Option<u64>,
        task: impl FnMut(&mut TaskContext<'_, C>) -> TaskControl + 'static,
    ) -> TaskId {
        let id = TaskId(*self.next_id);
        *self.next_id += 1;
        self.pending.push(ScheduledTask {
            id,
            next_run: self.tick + delay,
            period,
            run: Box::new(task),
        });
        tracing::trace!(%id, delay, ?period, "task registered");
        id
    }
}

/// Single-threaded cooperative task scheduler driven by explicit ticks.
///
/// Due tasks run in registration order. No two tasks ever run at the same
/// time, so tasks need no synchronization between each other.
pub struct Scheduler<C> {
    current_tick: u64,
    next_id: u64,
    tasks: Vec<ScheduledTask<C>>,
}

impl<C: 'static> Default for Scheduler<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> Scheduler<C> {
    pub fn new() -> Self {
        Self {
            current_tick: 0,
            next_id: 0,
            tasks: Vec::new(),
        }
    }

    /// Number of ticks run so far.
    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Number of registered tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether a task is still registered.
    pub fn is_scheduled(&self, id: TaskId) -> bool {
        self.tasks.iter().any(|t| t.id == id)
    }

    /// Run `f` with a context outside of any task, e.g. to register tasks
    /// before the first tick.
    pub fn with_context<R>(
        &mut self,
        host: &mut C,
        f: impl FnOnce(&mut TaskContext<'_, C>) -> R,
    ) -> R {
        let mut pending = Vec::new();
        let result = {
            let mut cx = TaskContext {
                host,
                tick: self.current_tick,
                task: None,
                next_id: &mut self.next_id,
                pending: &mut pending,
            };
            f(&mut cx)
        };
        self.tasks.append(&mut pending);
        result
    }

    /// Advance the clock by one tick and run every due task.
    pub fn tick(&mut self, host: &mut C) -> TickSummary {
        self.current_tick += 1;
        let tick = self.current_tick;
        let mut summary = TickSummary {
            tick,
            ..TickSummary::default()
        };

        let mut pending = Vec::new();
        let mut kept = Vec::with_capacity(self.tasks.len());
        for mut task in std::mem::take(&mut self.tasks) {
            if task.next_run > tick {
                kept.push(task);
                continue;
            }

            let control = {
                let mut cx = TaskContext {
                    host: &mut *host,
                    tick,
                    task: Some(task.id),
                    next_id: &mut self.next_id,
                    pending: &mut pending,
                };
                (task.run)(&mut cx)
            };
            summary.ran += 1;

            match (control, task.period) {
                (TaskControl::Continue, Some(period)) => {
                    task.next_run = tick + period;
                    kept.push(task);
                }
                _ => {
                    tracing::trace!(id = %task.id, tick, "task retired");
                    summary.retired.push(task.id);
                }
            }
        }
        kept.append(&mut pending);
        self.tasks = kept;

        summary
    }

    /// Deregister a task from outside. Returns false if it was not registered.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// Deregister every task, e.g. on host shutdown. Returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.tasks.len();
        self.tasks.clear();
        count
    }
}
