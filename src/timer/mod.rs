//! Periodic task scheduler.
//!
//! ## Model
//!
//! Tasks are registered once, before the scheduler thread starts, and then
//! cycle forever: expire, run on a worker thread, reschedule at
//! `completion + period`. A task is never queued while it runs, so two
//! invocations of the same task can't overlap. Late completions push the
//! next firing back; missed periods are not caught up.
//!
//! ## Components
//!
//! - [`TimerTask`]: what a periodic job implements
//! - [`TimerQueue`]: expiry ordering by `(expire_ms, id)`
//! - [`TimerService`]: the scheduler thread and worker dispatch

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

pub mod queue;
pub mod service;

pub use queue::TimerQueue;
pub use service::TimerService;

/// Identity of a registered task. `TimerId(0)` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(pub u64);

impl TimerId {
    /// Id of the scheduler's internal sentinel task.
    pub const SENTINEL: TimerId = TimerId(0);
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// A periodic job.
pub trait TimerTask: Send + Sync {
    /// Stable identity, unique within one service.
    fn timer_id(&self) -> TimerId;

    /// Delay between the end of one run and the start of the next.
    fn period(&self) -> Duration;

    /// Run once. Panics are caught and logged by the scheduler.
    fn on_timer(&self);
}

/// Scheduler setup and lifecycle errors.
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer task {0} registered twice")]
    DuplicateTask(TimerId),

    #[error("timer task {0} has a period under one millisecond")]
    ZeroPeriod(TimerId),

    #[error("timer service already started")]
    AlreadyStarted,

    #[error("failed to spawn timer thread: {0}")]
    Spawn(#[from] io::Error),
}
