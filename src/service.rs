//! Service lifecycle.
//!
//! ```text
//! Created -> start() -> Starting -> started() -> Running
//!         -> stop_requested() -> Stopping -> stopped() -> Stopped
//! ```
//!
//! A service accepts external requests only while `Running`.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle hooks driven by the node, in order.
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    fn start(&self);

    fn started(&self);

    fn stop_requested(&self);

    fn stopped(&self);
}

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    Created = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl Phase {
    fn from_u8(value: u8) -> Phase {
        match value {
            0 => Phase::Created,
            1 => Phase::Starting,
            2 => Phase::Running,
            3 => Phase::Stopping,
            _ => Phase::Stopped,
        }
    }
}

/// Atomic lifecycle phase shared by the request path and the node.
#[derive(Debug)]
pub struct ServiceState {
    phase: AtomicU8,
}

impl Default for ServiceState {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Created as u8),
        }
    }
}

impl ServiceState {
    #[inline]
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move forward to `next`. Returns false (and changes nothing) if the
    /// service is already at or past it.
    pub fn advance(&self, next: Phase) -> bool {
        let mut current = self.phase.load(Ordering::Acquire);
        loop {
            if current >= next as u8 {
                return false;
            }
            match self.phase.compare_exchange_weak(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Requests are accepted between `started()` and `stop_requested()`.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_only_moves_forward() {
        let state = ServiceState::default();
        assert_eq!(state.phase(), Phase::Created);
        assert!(!state.is_running());

        assert!(state.advance(Phase::Starting));
        assert!(state.advance(Phase::Running));
        assert!(state.is_running());
        assert!(!state.advance(Phase::Starting));

        assert!(state.advance(Phase::Stopped));
        assert!(!state.advance(Phase::Stopping));
        assert_eq!(state.phase(), Phase::Stopped);
    }
}
