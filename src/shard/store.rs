//! Sharded intake store.
//!
//! ## Architecture
//!
//! Players are partitioned by `id & (shard_count - 1)`. Each shard keeps,
//! behind one lock:
//!
//! - **players**: id -> registration flags (the source of truth for intake)
//! - **pending_adds**: entries registered since the last tick
//! - **pending_cancels**: ids whose deferred cancel awaits the next tick
//! - **just_matched**: ids placed in a room by the last tick
//! - **free_queue**: entries retired by the last tick, pooled on the next
//! - **pool**: entries ready for reuse
//!
//! ## Ownership
//!
//! An entry is owned by exactly one party at a time: the shard's add queue,
//! then the scheduler's board, then the shard's free queue, then the pool.
//! Every hand-over happens under the shard lock, so a pooled entry can never
//! still be referenced by the board.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::shard::EntryPool;
use crate::types::{CancelOutcome, MatchEntry, MatchError, PlayerId, Score};

/// Externally visible state of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerStatus {
    /// Registered, not yet merged by a tick
    Pending,
    /// On the board, waiting for a room
    Waiting,
    /// Deferred cancel accepted, not yet processed
    CancelRequested,
    /// Placed in a room
    Matched,
}

/// Intake-side flags for one registered player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Registration {
    in_matching: bool,
    cancel_requested: bool,
    matched: bool,
}

impl Registration {
    fn status(&self) -> PlayerStatus {
        if self.matched {
            PlayerStatus::Matched
        } else if self.cancel_requested {
            PlayerStatus::CancelRequested
        } else if self.in_matching {
            PlayerStatus::Waiting
        } else {
            PlayerStatus::Pending
        }
    }
}

/// A registration leaving the shard during a drain.
///
/// Either a deferred cancel (`cancel_requested`) or a matched player whose
/// cancel was never requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retirement {
    pub id: PlayerId,
    pub cancel_requested: bool,
}

#[derive(Debug, Default)]
struct ShardInner {
    players: HashMap<PlayerId, Registration>,
    pending_adds: Vec<MatchEntry>,
    pending_cancels: Vec<PlayerId>,
    just_matched: Vec<PlayerId>,
    free_queue: Vec<MatchEntry>,
    pool: EntryPool,
}

/// One lock-protected partition of the intake store.
#[derive(Debug, Default)]
pub struct Shard {
    inner: Mutex<ShardInner>,
}

impl Shard {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(ShardInner {
                players: HashMap::with_capacity(capacity),
                pending_adds: Vec::with_capacity(capacity),
                pending_cancels: Vec::with_capacity(capacity),
                just_matched: Vec::with_capacity(capacity),
                free_queue: Vec::with_capacity(capacity),
                pool: EntryPool::with_capacity(capacity),
            }),
        }
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Register `id` and queue its entry for the next tick.
    pub fn register(&self, id: PlayerId, point: Score, now_secs: u64) -> Result<(), MatchError> {
        let mut guard = self.inner.lock();
        let ShardInner {
            players,
            pending_adds,
            pool,
            ..
        } = &mut *guard;

        let entry = pool.acquire(id, point, now_secs);
        if players.contains_key(&id) {
            pool.release(entry);
            return Err(MatchError::AlreadyRequested);
        }
        players.insert(id, Registration::default());
        pending_adds.push(entry);
        Ok(())
    }

    /// Cancel `id`.
    ///
    /// Entries that never reached the board are removed on the spot;
    /// everything else is queued for the next tick.
    pub fn cancel(&self, id: PlayerId) -> Result<CancelOutcome, MatchError> {
        let mut guard = self.inner.lock();
        let ShardInner {
            players,
            pending_adds,
            pending_cancels,
            pool,
            ..
        } = &mut *guard;

        let registration = players.get_mut(&id).ok_or(MatchError::NotRequested)?;
        if registration.cancel_requested {
            return Err(MatchError::DuplicateCancel);
        }
        if registration.matched {
            tracing::warn!(player = id, "cancel ignored, player already matched");
            return Err(MatchError::AlreadyMatched);
        }

        if !registration.in_matching {
            // Not merged yet, so it must still be in the add queue.
            let Some(pos) = pending_adds.iter().position(|e| e.id == id) else {
                tracing::error!(player = id, "registration not merged and not queued");
                return Err(MatchError::InvalidState);
            };
            let entry = pending_adds.remove(pos);
            players.remove(&id);
            pool.release(entry);
            return Ok(CancelOutcome::Removed);
        }

        registration.cancel_requested = true;
        pending_cancels.push(id);
        Ok(CancelOutcome::Deferred)
    }

    /// Current status of `id`, if registered.
    pub fn status(&self, id: PlayerId) -> Option<PlayerStatus> {
        self.inner.lock().players.get(&id).map(Registration::status)
    }

    // ========================================================================
    // Tick side (scheduler thread only)
    // ========================================================================

    /// Move this shard's queued work onto the scheduler's lists.
    ///
    /// Order matters: adds are marked in-matching, matched players without a
    /// cancel join the cancel queue, cancelled/matched players leave the
    /// player map, and only then are last tick's retired entries pooled.
    pub fn drain(&self, adds: &mut Vec<MatchEntry>, retirements: &mut Vec<Retirement>) {
        let mut guard = self.inner.lock();
        let ShardInner {
            players,
            pending_adds,
            pending_cancels,
            just_matched,
            free_queue,
            pool,
        } = &mut *guard;

        for mut entry in pending_adds.drain(..) {
            if let Some(registration) = players.get_mut(&entry.id) {
                registration.in_matching = true;
            }
            entry.in_matching = true;
            adds.push(entry);
        }

        for id in just_matched.drain(..) {
            let cancel_pending = players.get(&id).map_or(false, |r| r.cancel_requested);
            if !cancel_pending {
                pending_cancels.push(id);
            }
        }

        for id in pending_cancels.drain(..) {
            let cancel_requested = players
                .remove(&id)
                .map_or(false, |r| r.cancel_requested);
            retirements.push(Retirement { id, cancel_requested });
        }

        for entry in free_queue.drain(..) {
            pool.release(entry);
        }
    }

    /// Record this tick's results: flag matched players and take back
    /// retired entries for pooling on the next drain.
    pub fn absorb(&self, matched: &[PlayerId], retired: &mut Vec<MatchEntry>) {
        if matched.is_empty() && retired.is_empty() {
            return;
        }
        let mut guard = self.inner.lock();
        let ShardInner {
            players,
            just_matched,
            free_queue,
            ..
        } = &mut *guard;

        for &id in matched {
            if let Some(registration) = players.get_mut(&id) {
                registration.matched = true;
            }
            just_matched.push(id);
        }
        free_queue.append(retired);
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Registered players (pending, waiting, or awaiting cleanup).
    pub fn player_count(&self) -> usize {
        self.inner.lock().players.len()
    }

    /// Entries parked in the pool.
    pub fn pooled(&self) -> usize {
        self.inner.lock().pool.available()
    }

    /// (allocated, reused) counters of the pool.
    pub fn pool_counters(&self) -> (u64, u64) {
        let guard = self.inner.lock();
        (guard.pool.allocated(), guard.pool.reused())
    }
}

// ============================================================================
// ShardSet
// ============================================================================

/// Fixed array of shards addressed by player id.
#[derive(Debug)]
pub struct ShardSet {
    shards: Box<[Shard]>,
    mask: u64,
}

impl ShardSet {
    /// `count` must be a power of two (checked by config validation).
    pub fn new(count: usize, capacity: usize) -> Self {
        debug_assert!(count.is_power_of_two());
        let shards: Vec<Shard> = (0..count).map(|_| Shard::with_capacity(capacity)).collect();
        Self {
            shards: shards.into_boxed_slice(),
            mask: (count as u64).saturating_sub(1),
        }
    }

    /// Shard index for `id`.
    #[inline]
    pub fn index_of(&self, id: PlayerId) -> usize {
        ((id as u64) & self.mask) as usize
    }

    #[inline]
    pub fn shard_for(&self, id: PlayerId) -> &Shard {
        &self.shards[self.index_of(id)]
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Shard {
        &self.shards[index]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shard> {
        self.shards.iter()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
