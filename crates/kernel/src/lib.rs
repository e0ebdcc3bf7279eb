//! Host kernel: the collaborators pre-generation runs against.
//!
//! # Invariants
//! - All tasks run on one cooperative loop, one at a time, in registration order.
//! - A task that cancels itself is never run again.
//! - The host owns regions; callers only reference them by `RegionId`.

pub mod host;
pub mod scheduler;
pub mod server;

pub use host::RegionHost;
pub use scheduler::{Scheduler, TaskContext, TaskControl, TaskId, TickSummary};
pub use server::{Backend, HostError, Server};
