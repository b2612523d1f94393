//! Scheduler-side board: active entries and the two sorted views.
//!
//! ## Architecture
//!
//! - **Slab**: arena owning every merged entry, keyed by stable `usize`
//! - **HashMap**: player id -> slab key, for retiring cancelled players
//! - **by_score**: slab keys sorted by `(point, id)` ascending
//! - **by_arrival**: slab keys, oldest registration first (append-only)
//!
//! Only the tick touches the board, so nothing in here is locked.
//!
//! ## Rebuild
//!
//! Each tick either refreshes bounds in place (no churn since the last
//! tick) or rebuilds both views. The score view is a single linear merge of
//! the surviving entries with the score-sorted pending adds; the arrival view
//! keeps survivors in place and appends the new entries. Both are written into
//! a scratch buffer that is then swapped in.

use std::cmp::Ordering;
use std::collections::HashMap;

use sha2::{Digest, Sha256};
use slab::Slab;

use crate::types::{score_order, MatchEntry, PlayerId, ToleranceTable};

/// Active entries plus the score and arrival views.
#[derive(Debug, Default)]
pub struct MatchBoard {
    /// Merged entries
    entries: Slab<MatchEntry>,

    /// Player id -> slab key
    index: HashMap<PlayerId, usize>,

    /// Slab keys by ascending `(point, id)`
    by_score: Vec<usize>,

    /// Slab keys by registration order
    by_arrival: Vec<usize>,

    /// Swap buffer for rebuilds
    scratch: Vec<usize>,
}

/// What a rebuild did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebuild {
    /// Views untouched, bounds refreshed
    BoundsOnly,
    /// Both views rebuilt
    Full { added: usize, dropped: usize },
}

impl MatchBoard {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Slab::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            by_score: Vec::with_capacity(capacity),
            by_arrival: Vec::with_capacity(capacity),
            scratch: Vec::with_capacity(capacity),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Entries in the views.
    #[inline]
    pub fn len(&self) -> usize {
        self.by_score.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_score.is_empty()
    }

    /// Entries held by the arena, including ones settled since the last rebuild.
    #[inline]
    pub fn arena_len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn by_score(&self) -> &[usize] {
        &self.by_score
    }

    #[inline]
    pub fn by_arrival(&self) -> &[usize] {
        &self.by_arrival
    }

    #[inline]
    pub fn entry(&self, key: usize) -> &MatchEntry {
        &self.entries[key]
    }

    #[inline]
    pub fn entry_mut(&mut self, key: usize) -> &mut MatchEntry {
        &mut self.entries[key]
    }

    pub fn get(&self, id: PlayerId) -> Option<&MatchEntry> {
        self.index.get(&id).map(|&key| &self.entries[key])
    }

    pub fn key_of(&self, id: PlayerId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    // ========================================================================
    // Rebuild
    // ========================================================================

    /// Flag a board entry as cancelled so the next rebuild drops it.
    ///
    /// Returns false if the player is not on the board.
    pub fn mark_cancelled(&mut self, id: PlayerId) -> bool {
        match self.index.get(&id) {
            Some(&key) => {
                self.entries[key].cancel_requested = true;
                true
            }
            None => false,
        }
    }

    /// Refresh the views for this tick.
    ///
    /// With no matches last tick, no adds and no cancels, the views are left
    /// alone and only `point_bound` is recomputed. Otherwise settled entries
    /// are dropped and `adds` are merged in. `adds` is drained.
    pub fn rebuild(
        &mut self,
        adds: &mut Vec<MatchEntry>,
        has_settled: bool,
        now_secs: u64,
        tolerance: &ToleranceTable,
    ) -> Rebuild {
        if !has_settled && adds.is_empty() {
            for &key in &self.by_score {
                let entry = &mut self.entries[key];
                entry.point_bound = tolerance.bound_for(entry.waited_secs(now_secs));
            }
            return Rebuild::BoundsOnly;
        }

        let before = self.by_score.len();
        adds.sort_unstable_by(|a, b| score_order(a.score_key(), b.score_key()));
        let mut new_keys = Vec::with_capacity(adds.len());
        for entry in adds.drain(..) {
            let id = entry.id;
            let key = self.entries.insert(entry);
            if let Some(stale) = self.index.insert(id, key) {
                tracing::error!(player = id, key = stale, "player already on the board");
            }
            new_keys.push(key);
        }

        let kept = self.merge_by_score(&new_keys);
        self.append_by_arrival(&mut new_keys, now_secs, tolerance);

        Rebuild::Full {
            added: self.by_score.len() - kept,
            dropped: before - kept,
        }
    }

    /// Merge survivors of `by_score` with `new_keys` (already score-sorted).
    /// Returns the number of survivors.
    fn merge_by_score(&mut self, new_keys: &[usize]) -> usize {
        let entries = &mut self.entries;
        let out = &mut self.scratch;
        out.clear();
        out.reserve(self.by_score.len() + new_keys.len());

        let mut kept = 0;
        let mut pending = new_keys.iter().copied().peekable();
        for &key in &self.by_score {
            if entries[key].is_settled() {
                continue;
            }
            let existing = entries[key].score_key();
            while let Some(&add) = pending.peek() {
                if score_order(entries[add].score_key(), existing) != Ordering::Less {
                    break;
                }
                entries[add].score_index = out.len();
                out.push(add);
                pending.next();
            }
            entries[key].score_index = out.len();
            out.push(key);
            kept += 1;
        }
        for add in pending {
            entries[add].score_index = out.len();
            out.push(add);
        }

        std::mem::swap(&mut self.by_score, &mut self.scratch);
        kept
    }

    /// Keep surviving arrival order, append `new_keys` oldest first, and
    /// recompute every bound on the way.
    fn append_by_arrival(
        &mut self,
        new_keys: &mut [usize],
        now_secs: u64,
        tolerance: &ToleranceTable,
    ) {
        let entries = &mut self.entries;
        let out = &mut self.scratch;
        out.clear();
        out.reserve(self.by_arrival.len() + new_keys.len());

        new_keys.sort_unstable_by_key(|&key| (entries[key].registered_at, entries[key].id));

        for &key in self.by_arrival.iter().chain(new_keys.iter()) {
            let entry = &mut entries[key];
            if entry.is_settled() {
                continue;
            }
            entry.arrival_index = out.len();
            entry.point_bound = tolerance.bound_for(entry.waited_secs(now_secs));
            out.push(key);
        }

        std::mem::swap(&mut self.by_arrival, &mut self.scratch);
    }

    /// Remove a settled player from the arena. Call only after a rebuild has
    /// dropped it from the views.
    pub fn retire(&mut self, id: PlayerId) -> Option<MatchEntry> {
        let key = self.index.remove(&id)?;
        let entry = self.entries.remove(key);
        debug_assert!(entry.is_settled());
        Some(entry)
    }

    // ========================================================================
    // Digest
    // ========================================================================

    /// SHA-256 over the score view `(id, point, bound)` and the arrival view.
    ///
    /// Identical input sequences and timestamps yield identical digests.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update((self.by_score.len() as u64).to_le_bytes());
        for &key in &self.by_score {
            let entry = &self.entries[key];
            hasher.update(entry.id.to_le_bytes());
            hasher.update(entry.point.to_le_bytes());
            hasher.update(entry.point_bound.to_le_bytes());
            hasher.update([entry.matched as u8]);
        }
        for &key in &self.by_arrival {
            hasher.update(self.entries[key].id.to_le_bytes());
        }

        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    /// Verify view invariants. Used by tests and debug assertions.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (pos, &key) in self.by_score.iter().enumerate() {
            let entry = &self.entries[key];
            if entry.score_index != pos {
                return Err(format!(
                    "player {} score_index {} at {}",
                    entry.id, entry.score_index, pos
                ));
            }
            if pos > 0 {
                let prev = &self.entries[self.by_score[pos - 1]];
                if score_order(prev.score_key(), entry.score_key()) != Ordering::Less {
                    return Err(format!("score view unsorted at {}", pos));
                }
            }
        }
        for (pos, &key) in self.by_arrival.iter().enumerate() {
            let entry = &self.entries[key];
            if entry.arrival_index != pos {
                return Err(format!(
                    "player {} arrival_index {} at {}",
                    entry.id, entry.arrival_index, pos
                ));
            }
        }
        if self.by_arrival.len() != self.by_score.len() {
            return Err(format!(
                "view sizes differ: score {} arrival {}",
                self.by_score.len(),
                self.by_arrival.len()
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn adds(specs: &[(PlayerId, i64, u64)]) -> Vec<MatchEntry> {
        specs
            .iter()
            .map(|&(id, point, at)| {
                let mut e = MatchEntry::new(id, point, at);
                e.in_matching = true;
                e
            })
            .collect()
    }

    fn score_ids(board: &MatchBoard) -> Vec<PlayerId> {
        board.by_score().iter().map(|&k| board.entry(k).id).collect()
    }

    fn arrival_ids(board: &MatchBoard) -> Vec<PlayerId> {
        board.by_arrival().iter().map(|&k| board.entry(k).id).collect()
    }

    #[test]
    fn test_first_rebuild_sorts_by_score_then_id() {
        let table = ToleranceTable::default();
        let mut board = MatchBoard::with_capacity(8);
        let mut pending = adds(&[(3, 200, 0), (1, 100, 0), (2, 200, 0), (4, 50, 0)]);

        let result = board.rebuild(&mut pending, false, 0, &table);

        assert_eq!(result, Rebuild::Full { added: 4, dropped: 0 });
        assert!(pending.is_empty());
        assert_eq!(score_ids(&board), vec![4, 1, 2, 3]);
        assert_eq!(board.check_invariants(), Ok(()));
    }

    #[test]
    fn test_merge_keeps_survivors_and_drops_settled() {
        let table = ToleranceTable::default();
        let mut board = MatchBoard::with_capacity(8);
        board.rebuild(&mut adds(&[(1, 100, 0), (2, 300, 0), (3, 500, 0)]), false, 0, &table);

        assert!(board.mark_cancelled(2));
        let key = board.key_of(3).unwrap();
        board.entry_mut(key).matched = true;

        let mut new = adds(&[(4, 200, 1), (5, 600, 1), (6, 100, 1)]);
        let result = board.rebuild(&mut new, true, 1, &table);

        assert_eq!(result, Rebuild::Full { added: 3, dropped: 2 });
        assert_eq!(score_ids(&board), vec![1, 6, 4, 5]);
        assert_eq!(arrival_ids(&board), vec![1, 4, 5, 6]);
        assert_eq!(board.check_invariants(), Ok(()));

        // Settled entries are still in the arena until retired
        assert_eq!(board.arena_len(), 6);
        assert!(board.retire(2).unwrap().cancel_requested);
        assert!(board.retire(3).unwrap().matched);
        assert!(board.retire(3).is_none());
        assert_eq!(board.arena_len(), 4);
    }

    #[test]
    fn test_arrival_appends_new_entries_oldest_first() {
        let table = ToleranceTable::default();
        let mut board = MatchBoard::with_capacity(8);
        board.rebuild(&mut adds(&[(10, 0, 5)]), false, 5, &table);

        board.rebuild(&mut adds(&[(7, 900, 9), (8, 100, 6), (9, 500, 6)]), false, 10, &table);

        assert_eq!(arrival_ids(&board), vec![10, 8, 9, 7]);
    }

    #[test]
    fn test_idle_rebuild_only_refreshes_bounds() {
        let table = ToleranceTable::default();
        let mut board = MatchBoard::with_capacity(8);
        board.rebuild(&mut adds(&[(1, 100, 0), (2, 5000, 0)]), false, 0, &table);
        let score_before = board.by_score().to_vec();
        let arrival_before = board.by_arrival().to_vec();
        assert_eq!(board.get(1).unwrap().point_bound, 500);

        let result = board.rebuild(&mut Vec::new(), false, 25, &table);

        assert_eq!(result, Rebuild::BoundsOnly);
        assert_eq!(board.by_score(), &score_before[..]);
        assert_eq!(board.by_arrival(), &arrival_before[..]);
        assert_eq!(board.get(1).unwrap().point_bound, 1500);
        assert_eq!(board.get(2).unwrap().point_bound, 1500);
        assert_eq!(board.check_invariants(), Ok(()));
    }

    #[test]
    fn test_digest_tracks_content() {
        let table = ToleranceTable::default();
        let mut a = MatchBoard::with_capacity(4);
        let mut b = MatchBoard::with_capacity(4);
        a.rebuild(&mut adds(&[(1, 100, 0), (2, 200, 0)]), false, 0, &table);
        b.rebuild(&mut adds(&[(2, 200, 0), (1, 100, 0)]), false, 0, &table);
        assert_eq!(a.digest(), b.digest());

        b.rebuild(&mut Vec::new(), false, 15, &table);
        assert_ne!(a.digest(), b.digest());
    }
}
