//! Caller-facing outcomes and errors.
//!
//! None of these indicate corruption. `InvalidState` is the one defensive
//! case: the engine logs it loudly and carries on.

use thiserror::Error;

/// Errors returned by `add` / `cancel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum MatchError {
    /// Player id is not strictly positive
    #[error("invalid player id")]
    InvalidRequest,

    /// Request made outside the Started..StopRequested window
    #[error("matchmaking service is not running")]
    NotRunning,

    /// Player already has a live registration
    #[error("player already requested matchmaking")]
    AlreadyRequested,

    /// Cancel for a player with no registration
    #[error("player has no matchmaking request")]
    NotRequested,

    /// Cancel already pending for this player
    #[error("cancellation already requested")]
    DuplicateCancel,

    /// Player was placed in a room; the room stands
    #[error("player already matched")]
    AlreadyMatched,

    /// Registration is neither queued nor merged
    #[error("registration is in an inconsistent state")]
    InvalidState,
}

/// Result of an accepted cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelOutcome {
    /// Removed synchronously; the entry never reached the board
    Removed,

    /// Queued for the next tick; the player may still be matched first
    Deferred,
}

impl CancelOutcome {
    /// True when the cancel took effect immediately.
    #[inline]
    pub fn directly_removed(self) -> bool {
        matches!(self, CancelOutcome::Removed)
    }
}

/// Configuration rejected at construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("shard count must be a non-zero power of two, got {0}")]
    ShardCount(usize),

    #[error("room size must be at least 2, got {0}")]
    RoomSize(usize),

    #[error("tick period must be non-zero")]
    TickPeriod,

    #[error("tolerance table must not be empty")]
    EmptyTolerance,

    #[error("tolerance thresholds must be strictly ascending (step {index})")]
    UnorderedTolerance { index: usize },

    #[error("tolerance bound must not be negative (step {index})")]
    NegativeBound { index: usize },

    #[error("invalid value for {key}: {value:?}")]
    InvalidEnv { key: &'static str, value: String },
}

// ============================================================================
// Unit Tests
// ============================================================================
