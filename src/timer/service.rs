//! Scheduler thread and worker dispatch.
//!
//! ## Loop
//!
//! 1. Sleep until the earliest expiry or a wake signal (new earliest expiry,
//!    or shutdown) on the wake channel.
//! 2. Pop every due task and mark it in flight.
//! 3. Run each popped task on its own detached worker thread.
//!
//! A worker requeues its task at `completion + period` and wakes the loop
//! if the task became the earliest. A sentinel task with a one-year period
//! keeps the queue non-empty.
//!
//! ## Shutdown
//!
//! [`TimerService::stop`] sets the stop flag and wakes the loop. The loop
//! stops popping, polls until no task is in flight, and exits; `stop`
//! returns once it has joined the thread.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::timer::{TimerError, TimerId, TimerQueue, TimerTask};

/// Poll interval while waiting for in-flight tasks on shutdown.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Period of the sentinel task.
const SENTINEL_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Signals for the scheduler thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wake {
    /// The earliest expiry moved forward
    Reschedule,
    /// Stop requested
    Shutdown,
}

/// Keeps the queue non-empty so the loop always has a deadline.
struct Sentinel;

impl TimerTask for Sentinel {
    fn timer_id(&self) -> TimerId {
        TimerId::SENTINEL
    }

    fn period(&self) -> Duration {
        SENTINEL_PERIOD
    }

    fn on_timer(&self) {}
}

struct Slot {
    task: Arc<dyn TimerTask>,
    period_ms: u64,
    /// None while the task is running
    expire_at: Option<u64>,
    runs: u64,
}

#[derive(Default)]
struct State {
    slots: HashMap<TimerId, Slot>,
    queue: TimerQueue,
    in_flight: usize,
}

struct Shared {
    state: Mutex<State>,
    wake_tx: Sender<Wake>,
    wake_rx: Receiver<Wake>,
    stopping: AtomicBool,
    epoch: Instant,
}

impl Shared {
    /// Milliseconds since the service was created.
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn wake(&self, signal: Wake) {
        // Both ends live in `Shared`, so the send can't fail.
        let _ = self.wake_tx.send(signal);
    }
}

/// Periodic task scheduler.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use skillmatch::timer::{TimerId, TimerService, TimerTask};
///
/// struct Counter(AtomicU64);
///
/// impl TimerTask for Counter {
///     fn timer_id(&self) -> TimerId { TimerId(1) }
///     fn period(&self) -> Duration { Duration::from_millis(5) }
///     fn on_timer(&self) { self.0.fetch_add(1, Ordering::Relaxed); }
/// }
///
/// let counter = Arc::new(Counter(AtomicU64::new(0)));
/// let service = TimerService::new();
/// service.register(counter.clone()).unwrap();
/// service.begin().unwrap();
/// std::thread::sleep(Duration::from_millis(50));
/// service.stop();
///
/// assert!(counter.0.load(Ordering::Relaxed) > 0);
/// ```
pub struct TimerService {
    shared: Arc<Shared>,
    started: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Default for TimerService {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService {
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
        let service = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                wake_tx,
                wake_rx,
                stopping: AtomicBool::new(false),
                epoch: Instant::now(),
            }),
            started: AtomicBool::new(false),
            handle: Mutex::new(None),
        };
        service.insert_slot(Arc::new(Sentinel));
        service
    }

    fn insert_slot(&self, task: Arc<dyn TimerTask>) {
        let id = task.timer_id();
        let period_ms = task.period().as_millis() as u64;
        self.shared.state.lock().slots.insert(
            id,
            Slot {
                task,
                period_ms,
                expire_at: None,
                runs: 0,
            },
        );
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Add a task. Only allowed before [`TimerService::begin`].
    pub fn register(&self, task: Arc<dyn TimerTask>) -> Result<(), TimerError> {
        if self.started.load(Ordering::Acquire) {
            return Err(TimerError::AlreadyStarted);
        }
        let id = task.timer_id();
        // The queue runs on whole milliseconds
        if task.period().as_millis() == 0 {
            return Err(TimerError::ZeroPeriod(id));
        }
        if self.shared.state.lock().slots.contains_key(&id) {
            return Err(TimerError::DuplicateTask(id));
        }
        self.insert_slot(task);
        Ok(())
    }

    /// Schedule every registered task at `now + period` and start the
    /// scheduler thread.
    pub fn begin(&self) -> Result<(), TimerError> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TimerError::AlreadyStarted);
        }

        let tasks = {
            let now = self.shared.now_ms();
            let mut guard = self.shared.state.lock();
            let State { slots, queue, .. } = &mut *guard;
            for (&id, slot) in slots.iter_mut() {
                let expire = now.saturating_add(slot.period_ms);
                slot.expire_at = Some(expire);
                queue.insert(id, expire);
            }
            slots.len()
        };

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("timer-queue".into())
            .spawn(move || run_loop(shared));
        let handle = match handle {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(error = %err, "timer thread spawn failed");
                self.unschedule_all();
                self.started.store(false, Ordering::Release);
                return Err(err.into());
            }
        };
        *self.handle.lock() = Some(handle);

        tracing::info!(tasks = tasks - 1, "timer service started");
        Ok(())
    }

    fn unschedule_all(&self) {
        let mut guard = self.shared.state.lock();
        let State { slots, queue, .. } = &mut *guard;
        for (&id, slot) in slots.iter_mut() {
            if let Some(expire) = slot.expire_at.take() {
                queue.remove(id, expire);
            }
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop the scheduler and wait for in-flight tasks. Idempotent.
    pub fn stop(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        self.shared.stopping.store(true, Ordering::Release);
        self.shared.wake(Wake::Shutdown);
        if handle.join().is_err() {
            tracing::error!("timer thread panicked");
        }
        tracing::info!("timer service stopped");
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.shared.stopping.load(Ordering::Acquire)
    }

    /// Registered tasks, not counting the sentinel.
    pub fn task_count(&self) -> usize {
        self.shared.state.lock().slots.len() - 1
    }

    /// Tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().in_flight
    }

    /// Completed runs of `id`.
    pub fn runs(&self, id: TimerId) -> Option<u64> {
        self.shared.state.lock().slots.get(&id).map(|slot| slot.runs)
    }

    /// Milliseconds until `id` next expires; None while it runs or if unknown.
    pub fn next_expiry_in(&self, id: TimerId) -> Option<Duration> {
        let now = self.shared.now_ms();
        let expire = self.shared.state.lock().slots.get(&id)?.expire_at?;
        Some(Duration::from_millis(expire.saturating_sub(now)))
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============================================================================
// Scheduler thread
// ============================================================================

fn run_loop(shared: Arc<Shared>) {
    loop {
        if shared.stopping.load(Ordering::Acquire) {
            break;
        }

        let wait = {
            let state = shared.state.lock();
            match state.queue.earliest() {
                Some((expire, _)) => Duration::from_millis(expire.saturating_sub(shared.now_ms())),
                None => SENTINEL_PERIOD,
            }
        };

        if !wait.is_zero() {
            match shared.wake_rx.recv_timeout(wait) {
                Ok(Wake::Reschedule) => continue,
                Ok(Wake::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }

        let due = pop_due(&shared);
        for task in due {
            dispatch(&shared, task);
        }
    }

    while shared.state.lock().in_flight > 0 {
        thread::sleep(DRAIN_POLL);
    }
}

/// Pop due tasks and mark them in flight.
fn pop_due(shared: &Shared) -> Vec<Arc<dyn TimerTask>> {
    let now = shared.now_ms();
    let mut guard = shared.state.lock();
    let State {
        slots,
        queue,
        in_flight,
    } = &mut *guard;

    let mut due = Vec::new();
    for id in queue.pop_due(now) {
        if let Some(slot) = slots.get_mut(&id) {
            slot.expire_at = None;
            *in_flight += 1;
            due.push(Arc::clone(&slot.task));
        }
    }
    due
}

fn dispatch(shared: &Arc<Shared>, task: Arc<dyn TimerTask>) {
    let id = task.timer_id();
    let worker_shared = Arc::clone(shared);
    let worker_task = Arc::clone(&task);
    let spawned = thread::Builder::new()
        .name(format!("timer-task-{}", id.0))
        .spawn(move || run_task(&worker_shared, worker_task));

    if let Err(err) = spawned {
        tracing::error!(timer = %id, error = %err, "worker spawn failed, running inline");
        run_task(shared, task);
    }
}

/// Run one task and requeue it at `completion + period`.
fn run_task(shared: &Shared, task: Arc<dyn TimerTask>) {
    let id = task.timer_id();
    if panic::catch_unwind(AssertUnwindSafe(|| task.on_timer())).is_err() {
        tracing::error!(timer = %id, "timer callback panicked");
    }

    let now = shared.now_ms();
    let became_earliest = {
        let mut guard = shared.state.lock();
        let State {
            slots,
            queue,
            in_flight,
        } = &mut *guard;
        *in_flight = in_flight.saturating_sub(1);

        let Some(slot) = slots.get_mut(&id) else {
            return;
        };
        let expire = now.saturating_add(slot.period_ms);
        slot.expire_at = Some(expire);
        slot.runs += 1;
        let became_earliest = queue.earliest().map_or(true, |(at, _)| expire < at);
        queue.insert(id, expire);
        became_earliest
    };

    if became_earliest {
        shared.wake(Wake::Reschedule);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
