//! Time source for the engine and the timer queue.
//!
//! All timestamps are Unix time. Milliseconds drive the timer queue; seconds
//! drive registration times and the tolerance schedule.
//!
//! - [`SystemClock`]: wall clock
//! - [`OffsetClock`]: wall clock shifted by an adjustable offset
//! - [`ManualClock`]: fully controlled, for deterministic tests

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond / second time source.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;

    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1_000
    }
}

fn system_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now_millis(&self) -> u64 {
        system_millis()
    }
}

/// Wall clock plus a signed offset that can be changed at runtime.
#[derive(Debug, Default)]
pub struct OffsetClock {
    offset_ms: AtomicI64,
}

impl OffsetClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current offset.
    pub fn set_offset_ms(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::Release);
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Acquire)
    }
}

impl Clock for OffsetClock {
    fn now_millis(&self) -> u64 {
        let now = system_millis() as i64;
        now.saturating_add(self.offset_ms()).max(0) as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    /// Start at a whole number of seconds.
    pub fn at_secs(secs: u64) -> Self {
        Self::new(secs * 1_000)
    }

    pub fn set_millis(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::Release);
    }

    pub fn advance_millis(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::AcqRel);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_millis(secs * 1_000);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::at_secs(100);
        assert_eq!(clock.now_secs(), 100);

        clock.advance_millis(1_500);
        assert_eq!(clock.now_millis(), 101_500);
        assert_eq!(clock.now_secs(), 101);

        clock.advance_secs(9);
        assert_eq!(clock.now_secs(), 110);
    }

    #[test]
    fn test_offset_clock_shifts_system_time() {
        let clock = OffsetClock::new();
        let base = SystemClock.now_secs();

        clock.set_offset_ms(20_000);
        let shifted = clock.now_secs();

        assert!(shifted >= base + 20);
        assert!(shifted <= base + 22);
    }
}
