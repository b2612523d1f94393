//! Matchmaking entry: one player's registration.
//!
//! ## Lifecycle
//!
//! ```text
//! add() -> Pending (shard add queue)
//!       -> InMatching (merged into the board by a tick)
//!       -> Matched | Cancelled
//!       -> free queue -> shard pool -> reused by a later add()
//! ```
//!
//! ## Score Window
//!
//! Each entry carries a `point_bound`, the half-width of the score range it
//! accepts. The bound is recomputed from the wait time on every tick, so the
//! window only ever widens while the player waits.

use std::cmp::Ordering;

/// Player identifier. Only strictly positive values are valid.
pub type PlayerId = i64;

/// Skill score.
pub type Score = i64;

/// Returns true if `id` can be registered.
#[inline]
pub fn is_valid_player_id(id: PlayerId) -> bool {
    id > 0
}

/// Ordering used by the score view: ascending point, ties broken by id.
///
/// # Example
///
/// ```
/// use std::cmp::Ordering;
/// use skillmatch::types::score_order;
///
/// assert_eq!(score_order((100, 2), (100, 1)), Ordering::Greater);
/// assert_eq!(score_order((99, 5), (100, 1)), Ordering::Less);
/// ```
#[inline]
pub fn score_order(a: (Score, PlayerId), b: (Score, PlayerId)) -> Ordering {
    a.0.cmp(&b.0).then(a.1.cmp(&b.1))
}

// ============================================================================
// MatchEntry
// ============================================================================

/// A player's matchmaking registration.
///
/// Entries are recycled through the owning shard's pool, so every field is
/// reset by [`MatchEntry::reset`] before reuse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchEntry {
    /// Player identifier (0 while the entry sits in a pool)
    pub id: PlayerId,

    /// Skill score
    pub point: Score,

    /// Registration time in seconds
    pub registered_at: u64,

    /// Half-width of the accepted score window, refreshed every tick
    pub point_bound: Score,

    /// Position in the score-ordered view
    pub score_index: usize,

    /// Position in the arrival-ordered view
    pub arrival_index: usize,

    /// Merged into the board at least once
    pub in_matching: bool,

    /// Cancellation accepted but not yet processed
    pub cancel_requested: bool,

    /// Placed in a room (terminal)
    pub matched: bool,
}

impl MatchEntry {
    /// Create a fresh entry for `id`.
    pub fn new(id: PlayerId, point: Score, registered_at: u64) -> Self {
        Self {
            id,
            point,
            registered_at,
            ..Self::default()
        }
    }

    /// Reinitialize a pooled entry for a new registration.
    pub fn reset(&mut self, id: PlayerId, point: Score, registered_at: u64) {
        *self = Self::new(id, point, registered_at);
    }

    /// Clear the entry before it goes back to a pool.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Seconds waited as of `now_secs`.
    #[inline]
    pub fn waited_secs(&self, now_secs: u64) -> u64 {
        now_secs.saturating_sub(self.registered_at)
    }

    /// Lowest score this entry accepts.
    #[inline]
    pub fn window_low(&self) -> Score {
        self.point.saturating_sub(self.point_bound)
    }

    /// Highest score this entry accepts.
    #[inline]
    pub fn window_high(&self) -> Score {
        self.point.saturating_add(self.point_bound)
    }

    /// Check whether `point` lies inside this entry's window.
    #[inline]
    pub fn accepts(&self, point: Score) -> bool {
        point >= self.window_low() && point <= self.window_high()
    }

    /// Two-sided compatibility: each score lies in the other's window.
    #[inline]
    pub fn compatible_with(&self, other: &MatchEntry) -> bool {
        self.accepts(other.point) && other.accepts(self.point)
    }

    /// Entries that must leave the board on the next rebuild.
    #[inline]
    pub fn is_settled(&self) -> bool {
        self.cancel_requested || self.matched
    }

    /// Sort key for the score view.
    #[inline]
    pub fn score_key(&self) -> (Score, PlayerId) {
        (self.point, self.id)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
