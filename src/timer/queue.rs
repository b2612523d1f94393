//! Expiry ordering for scheduled tasks.
//!
//! Primary key is the expiry in milliseconds, ties broken by task id, so
//! tasks due at the same instant always pop in the same order.

use std::collections::BTreeSet;

use crate::timer::TimerId;

/// Tasks waiting for their next expiry.
#[derive(Debug, Clone, Default)]
pub struct TimerQueue {
    by_expiry: BTreeSet<(u64, TimerId)>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `id` to expire at `expire_ms`.
    pub fn insert(&mut self, id: TimerId, expire_ms: u64) {
        self.by_expiry.insert((expire_ms, id));
    }

    /// Remove a queued task. Returns false if it was not queued at that expiry.
    pub fn remove(&mut self, id: TimerId, expire_ms: u64) -> bool {
        self.by_expiry.remove(&(expire_ms, id))
    }

    /// Earliest `(expire_ms, id)`, if any.
    #[inline]
    pub fn earliest(&self) -> Option<(u64, TimerId)> {
        self.by_expiry.first().copied()
    }

    /// Pop every task with `expire_ms <= now_ms`, earliest first.
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<TimerId> {
        let mut due = Vec::new();
        while let Some(&(expire_ms, id)) = self.by_expiry.first() {
            if expire_ms > now_ms {
                break;
            }
            self.by_expiry.pop_first();
            due.push(id);
        }
        due
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_expiry.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_expiry.is_empty()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earliest_and_tie_break() {
        let mut queue = TimerQueue::new();
        queue.insert(TimerId(5), 100);
        queue.insert(TimerId(2), 100);
        queue.insert(TimerId(1), 300);

        assert_eq!(queue.earliest(), Some((100, TimerId(2))));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_pop_due_inclusive() {
        let mut queue = TimerQueue::new();
        queue.insert(TimerId(1), 50);
        queue.insert(TimerId(2), 100);
        queue.insert(TimerId(3), 101);

        assert_eq!(queue.pop_due(100), vec![TimerId(1), TimerId(2)]);
        assert_eq!(queue.earliest(), Some((101, TimerId(3))));
        assert!(queue.pop_due(100).is_empty());
    }

    #[test]
    fn test_remove() {
        let mut queue = TimerQueue::new();
        queue.insert(TimerId(1), 50);

        assert!(!queue.remove(TimerId(1), 51));
        assert!(queue.remove(TimerId(1), 50));
        assert!(queue.is_empty());
        assert_eq!(queue.earliest(), None);
    }
}
