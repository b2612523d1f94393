//! Wait-time dependent score tolerance.
//!
//! ## Schedule
//!
//! The table is an ordered list of `(threshold_secs, bound)` steps. A player
//! who has waited `elapsed` seconds gets the bound of the first step whose
//! threshold is still greater than `elapsed`; once every threshold has passed
//! the last bound stays in effect.
//!
//! ```text
//! elapsed:   0 ........ 10 ........ 20 ........ 30 ........ 40 ....
//! bound:        500         1000        1500        2000       2000
//! ```
//!
//! ## Example
//!
//! ```
//! use skillmatch::types::ToleranceTable;
//!
//! let table = ToleranceTable::default();
//! assert_eq!(table.bound_for(0), 500);
//! assert_eq!(table.bound_for(10), 1000);
//! assert_eq!(table.bound_for(3600), 2000);
//! ```

use serde::{Deserialize, Serialize};

use crate::types::{ConfigError, Score};

/// One step of the tolerance schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToleranceStep {
    /// Waits strictly below this many seconds use `bound`
    pub threshold_secs: u64,

    /// Score half-width for this step
    pub bound: Score,
}

impl ToleranceStep {
    pub const fn new(threshold_secs: u64, bound: Score) -> Self {
        Self { threshold_secs, bound }
    }
}

/// Ordered tolerance schedule. Validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ToleranceStep>", into = "Vec<ToleranceStep>")]
pub struct ToleranceTable {
    steps: Vec<ToleranceStep>,
}

/// Default schedule: +-500 widening by 500 every 10 seconds up to +-2000.
pub const DEFAULT_TOLERANCE_STEPS: [ToleranceStep; 4] = [
    ToleranceStep::new(10, 500),
    ToleranceStep::new(20, 1000),
    ToleranceStep::new(30, 1500),
    ToleranceStep::new(40, 2000),
];

impl Default for ToleranceTable {
    fn default() -> Self {
        Self {
            steps: DEFAULT_TOLERANCE_STEPS.to_vec(),
        }
    }
}

impl ToleranceTable {
    /// Build a table, rejecting empty, unordered or negative schedules.
    pub fn new(steps: Vec<ToleranceStep>) -> Result<Self, ConfigError> {
        if steps.is_empty() {
            return Err(ConfigError::EmptyTolerance);
        }
        for (index, step) in steps.iter().enumerate() {
            if step.bound < 0 {
                return Err(ConfigError::NegativeBound { index });
            }
            if index > 0 && step.threshold_secs <= steps[index - 1].threshold_secs {
                return Err(ConfigError::UnorderedTolerance { index });
            }
        }
        Ok(Self { steps })
    }

    /// Parse `"10:500,20:1000"` style schedules (used by the env loader).
    pub fn parse(raw: &str) -> Option<Self> {
        let mut steps = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (threshold, bound) = part.split_once(':')?;
            steps.push(ToleranceStep::new(
                threshold.trim().parse().ok()?,
                bound.trim().parse().ok()?,
            ));
        }
        Self::new(steps).ok()
    }

    /// Bound in effect after waiting `elapsed_secs`.
    pub fn bound_for(&self, elapsed_secs: u64) -> Score {
        self.steps
            .iter()
            .find(|step| elapsed_secs < step.threshold_secs)
            .or_else(|| self.steps.last())
            .map_or(0, |step| step.bound)
    }

    /// Smallest wait (seconds) at which the bound reaches `gap`, if ever.
    pub fn wait_to_cover(&self, gap: Score) -> Option<u64> {
        let mut from = 0;
        for step in &self.steps {
            if step.bound >= gap {
                return Some(from);
            }
            from = step.threshold_secs;
        }
        None
    }

    #[inline]
    pub fn steps(&self) -> &[ToleranceStep] {
        &self.steps
    }

    /// Widest bound the schedule ever grants.
    pub fn max_bound(&self) -> Score {
        self.steps.iter().map(|s| s.bound).max().unwrap_or(0)
    }
}

impl TryFrom<Vec<ToleranceStep>> for ToleranceTable {
    type Error = ConfigError;

    fn try_from(steps: Vec<ToleranceStep>) -> Result<Self, Self::Error> {
        Self::new(steps)
    }
}

impl From<ToleranceTable> for Vec<ToleranceStep> {
    fn from(table: ToleranceTable) -> Self {
        table.steps
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
