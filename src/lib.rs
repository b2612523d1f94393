//! # Skillmatch
//!
//! Skill-based matchmaking: players register with a score, and a periodic
//! tick groups them into fixed-size rooms of mutually compatible scores.
//!
//! ## Architecture
//!
//! - **Shards**: lock-protected intake partitions, addressed by player id
//! - **Engine**: per-tick merge of the shards into a score-sorted board, then a
//!   greedy room search seeded by the longest-waiting players
//! - **Timer**: dedicated scheduler thread running periodic tasks on workers
//! - **Node**: wires engine and timer and orders their lifecycle
//!
//! ## Design Principles
//!
//! 1. **Short critical sections**: `add`/`cancel` hold one shard lock, briefly
//! 2. **Single writer**: only the tick touches the board, and ticks never overlap
//! 3. **Determinism**: identical inputs and timestamps give identical rooms
//! 4. **Recycling**: retired entries return to their shard's pool
//!
//! ## Matching Rule
//!
//! A player waiting `t` seconds accepts scores within `point +- bound(t)`,
//! where the bound widens in steps (see [`types::ToleranceTable`]). Two
//! players are compatible when each accepts the other's score; every pair in
//! a room is compatible.

// ============================================================================
// Module declarations
// ============================================================================

/// Core data types: MatchEntry, Room, ToleranceTable, errors
pub mod types;

/// Time sources
pub mod clock;

/// Engine configuration
pub mod config;

/// Outbound notification ports
pub mod notify;

/// Service lifecycle
pub mod service;

/// Intake shards and entry pools
pub mod shard;

/// Matchmaking engine: board, search and tick
pub mod engine;

/// Periodic task scheduler
pub mod timer;

/// Server node wiring engine and timer
pub mod node;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use clock::{Clock, ManualClock, OffsetClock, SystemClock};
pub use config::MatchmakingConfig;
pub use engine::{EngineStats, MatchmakingEngine, TickSummary};
pub use node::{NodeError, ServerNode};
pub use notify::{ChannelNotifier, MatchEvent, MatchNotifier, NoopNotifier};
pub use service::Service;
pub use shard::PlayerStatus;
pub use types::{
    CancelOutcome, MatchEntry, MatchError, PlayerId, Room, RoomId, Score, ToleranceTable,
};
