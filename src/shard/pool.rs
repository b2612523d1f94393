//! Per-shard entry pool.
//!
//! ## Design
//!
//! Retired entries are parked here instead of being dropped, and handed back
//! out by the next `add()` on the same shard. Entries are reset on the way
//! in ([`EntryPool::acquire`]) and cleared on the way out
//! ([`EntryPool::release`]), so a pooled entry never carries stale state.
//!
//! The pool lives inside the shard lock; it is never touched from two
//! threads at once.

use crate::types::{MatchEntry, PlayerId, Score};

/// Free list of retired entries.
#[derive(Debug, Default)]
pub struct EntryPool {
    free: Vec<MatchEntry>,

    /// Entries created because the free list was empty
    allocated: u64,

    /// Entries served from the free list
    reused: u64,
}

impl EntryPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            allocated: 0,
            reused: 0,
        }
    }

    /// Take an entry (reused if possible) initialized for a new registration.
    pub fn acquire(&mut self, id: PlayerId, point: Score, registered_at: u64) -> MatchEntry {
        match self.free.pop() {
            Some(mut entry) => {
                self.reused += 1;
                entry.reset(id, point, registered_at);
                entry
            }
            None => {
                self.allocated += 1;
                MatchEntry::new(id, point, registered_at)
            }
        }
    }

    /// Return an entry to the free list.
    pub fn release(&mut self, mut entry: MatchEntry) {
        entry.clear();
        self.free.push(entry);
    }

    /// Entries currently available for reuse.
    #[inline]
    pub fn available(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn allocated(&self) -> u64 {
        self.allocated
    }

    #[inline]
    pub fn reused(&self) -> u64 {
        self.reused
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
