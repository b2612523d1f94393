//! Matchmaking engine.
//!
//! ## Flow
//!
//! ```text
//! add()/cancel()  ->  shard queues        (any thread, one shard lock)
//! tick()          ->  drain every shard
//!                 ->  mark cancels, rebuild views
//!                 ->  retire settled entries
//!                 ->  form rooms
//!                 ->  hand results back to the shards
//!                 ->  notify
//! ```
//!
//! Ticks are driven by the timer service (see [`crate::timer`]), which never
//! runs two ticks at once. The board mutex is therefore uncontended; it only
//! exists so the engine can be shared behind an `Arc`.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use skillmatch::clock::ManualClock;
//! use skillmatch::config::MatchmakingConfig;
//! use skillmatch::engine::MatchmakingEngine;
//! use skillmatch::notify::NoopNotifier;
//! use skillmatch::service::Service;
//!
//! let config = MatchmakingConfig::default().with_room_size(2);
//! let engine = MatchmakingEngine::new(
//!     config,
//!     Arc::new(ManualClock::at_secs(100)),
//!     Arc::new(NoopNotifier),
//! ).unwrap();
//! engine.start();
//! engine.started();
//!
//! engine.add(1, 1500).unwrap();
//! engine.add(2, 1600).unwrap();
//! let summary = engine.tick();
//!
//! assert_eq!(summary.rooms_formed, 1);
//! assert_eq!(engine.rooms_formed(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::config::MatchmakingConfig;
use crate::notify::MatchNotifier;
use crate::service::{Phase, Service, ServiceState};
use crate::shard::{PlayerStatus, Retirement, ShardSet};
use crate::timer::{TimerId, TimerTask};
use crate::types::{
    is_valid_player_id, CancelOutcome, ConfigError, MatchEntry, MatchError, PlayerId, Score,
};

pub mod board;
pub mod search;

pub use board::{MatchBoard, Rebuild};
pub use search::form_rooms;

/// Timer id of the matchmaking tick.
pub const MATCHMAKING_TIMER: TimerId = TimerId(1);

/// Snapshot of engine counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub rooms_formed: u64,
    pub players_matched: u64,
    pub cancels_completed: u64,
    pub ticks: u64,
    /// Players on the board and still waiting after the last tick
    pub active_players: u64,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub players_added: usize,
    pub cancels_completed: usize,
    pub rooms_formed: usize,
    /// Views were rebuilt (false for a bounds-only refresh)
    pub rebuilt: bool,
    pub active_players: usize,
    /// Wall time of the pass, by the engine's clock
    pub tick_ms: u64,
}

#[derive(Debug, Default)]
struct Counters {
    rooms_formed: AtomicU64,
    players_matched: AtomicU64,
    cancels_completed: AtomicU64,
    ticks: AtomicU64,
    active_players: AtomicU64,
}

/// Scheduler-side state, touched only by `tick()` and introspection.
#[derive(Debug)]
struct TickState {
    board: MatchBoard,
    adds: Vec<MatchEntry>,
    retirements: Vec<Retirement>,
    /// Per shard: entries to hand back for pooling
    retired: Vec<Vec<MatchEntry>>,
    /// Per shard: players matched this tick
    matched: Vec<Vec<PlayerId>>,
    last_tick_rooms: usize,
}

/// Sharded matchmaking engine.
pub struct MatchmakingEngine {
    config: MatchmakingConfig,
    shards: ShardSet,
    tick_state: Mutex<TickState>,
    state: ServiceState,
    counters: Counters,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn MatchNotifier>,
}

impl MatchmakingEngine {
    /// Create an engine. The configuration is validated here.
    pub fn new(
        config: MatchmakingConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn MatchNotifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let shard_count = config.shard_count;
        let capacity = config.shard_capacity;
        let board_capacity = shard_count.saturating_mul(capacity);
        Ok(Self {
            shards: ShardSet::new(shard_count, capacity),
            tick_state: Mutex::new(TickState {
                board: MatchBoard::with_capacity(board_capacity),
                adds: Vec::with_capacity(board_capacity),
                retirements: Vec::with_capacity(board_capacity),
                retired: (0..shard_count).map(|_| Vec::with_capacity(capacity)).collect(),
                matched: (0..shard_count).map(|_| Vec::with_capacity(capacity)).collect(),
                last_tick_rooms: 0,
            }),
            state: ServiceState::default(),
            counters: Counters::default(),
            config,
            clock,
            notifier,
        })
    }

    // ========================================================================
    // Intake
    // ========================================================================

    fn check_request(&self, id: PlayerId) -> Result<(), MatchError> {
        if !is_valid_player_id(id) {
            return Err(MatchError::InvalidRequest);
        }
        if !self.state.is_running() {
            return Err(MatchError::NotRunning);
        }
        Ok(())
    }

    /// Register a player for matchmaking.
    pub fn add(&self, id: PlayerId, point: Score) -> Result<(), MatchError> {
        self.check_request(id)?;
        let now_secs = self.clock.now_secs();
        match self.shards.shard_for(id).register(id, point, now_secs) {
            Ok(()) => {
                tracing::debug!(player = id, point, "matchmaking requested");
                Ok(())
            }
            Err(err) => {
                tracing::debug!(player = id, error = %err, "add rejected");
                Err(err)
            }
        }
    }

    /// Withdraw a registration.
    ///
    /// `Removed` means the player never reached the board and is gone.
    /// `Deferred` means the next tick will drop it, unless a room claims the
    /// player first.
    pub fn cancel(&self, id: PlayerId) -> Result<CancelOutcome, MatchError> {
        self.check_request(id)?;
        let outcome = self.shards.shard_for(id).cancel(id);
        tracing::debug!(player = id, outcome = ?outcome, "cancel");
        outcome
    }

    /// Where `id` stands, if registered.
    pub fn player_status(&self, id: PlayerId) -> Option<PlayerStatus> {
        if !is_valid_player_id(id) {
            return None;
        }
        self.shards.shard_for(id).status(id)
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Run one matchmaking pass.
    pub fn tick(&self) -> TickSummary {
        let started_ms = self.clock.now_millis();
        let mut guard = self.tick_state.lock();
        let TickState {
            board,
            adds,
            retirements,
            retired,
            matched,
            last_tick_rooms,
        } = &mut *guard;
        let now_secs = self.clock.now_secs();

        for shard in self.shards.iter() {
            shard.drain(adds, retirements);
        }
        let players_added = adds.len();

        for retirement in retirements.iter() {
            let Some(key) = board.key_of(retirement.id) else {
                tracing::error!(player = retirement.id, "retired player not on the board");
                continue;
            };
            let entry = board.entry_mut(key);
            if retirement.cancel_requested {
                entry.cancel_requested = true;
            } else if !entry.matched {
                tracing::error!(player = entry.id, "retired player neither matched nor cancelled");
                entry.cancel_requested = true;
            }
        }

        let has_settled = *last_tick_rooms > 0 || !retirements.is_empty();
        let rebuilt = match board.rebuild(adds, has_settled, now_secs, &self.config.tolerance) {
            Rebuild::BoundsOnly => false,
            Rebuild::Full { added, dropped } => {
                tracing::trace!(added, dropped, "views rebuilt");
                true
            }
        };
        debug_assert_eq!(board.check_invariants(), Ok(()));

        let mut cancelled = Vec::new();
        for retirement in retirements.drain(..) {
            let Some(entry) = board.retire(retirement.id) else {
                continue;
            };
            if retirement.cancel_requested {
                if entry.matched {
                    tracing::warn!(player = entry.id, "cancel ignored, player already matched");
                } else {
                    cancelled.push(entry.clone());
                }
            }
            retired[self.shards.index_of(entry.id)].push(entry);
        }

        let next_room = self.counters.rooms_formed.load(Ordering::Relaxed) + 1;
        let rooms = search::form_rooms(board, self.config.room_size, next_room);

        let mut players_matched = 0;
        for room in &rooms {
            for id in room.member_ids() {
                matched[self.shards.index_of(id)].push(id);
                players_matched += 1;
            }
        }
        for (index, shard) in self.shards.iter().enumerate() {
            shard.absorb(&matched[index], &mut retired[index]);
            matched[index].clear();
        }

        let active_players = board.len() - players_matched;
        let cancels_completed = cancelled.len();
        *last_tick_rooms = rooms.len();
        drop(guard);

        // Notifiers may call back into the engine
        for entry in &cancelled {
            self.notifier.notify_cancel_completed(entry);
        }
        for room in &rooms {
            tracing::info!(
                room = room.id,
                players = room.len(),
                average_point = room.average_point(),
                seed = room.seed().map_or(0, |m| m.id),
                "room formed"
            );
            self.notifier.notify_matched(room);
        }

        let counters = &self.counters;
        counters.rooms_formed.fetch_add(rooms.len() as u64, Ordering::Relaxed);
        counters.players_matched.fetch_add(players_matched as u64, Ordering::Relaxed);
        counters.cancels_completed.fetch_add(cancels_completed as u64, Ordering::Relaxed);
        counters.ticks.fetch_add(1, Ordering::Relaxed);
        counters.active_players.store(active_players as u64, Ordering::Relaxed);

        let summary = TickSummary {
            players_added,
            cancels_completed,
            rooms_formed: rooms.len(),
            rebuilt,
            active_players,
            tick_ms: self.clock.now_millis().saturating_sub(started_ms),
        };
        tracing::debug!(
            tick_ms = summary.tick_ms,
            players = summary.active_players,
            added = summary.players_added,
            rooms = summary.rooms_formed,
            rebuilt = summary.rebuilt,
            "tick"
        );
        summary
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn config(&self) -> &MatchmakingConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn rooms_formed(&self) -> u64 {
        self.counters.rooms_formed.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            rooms_formed: c.rooms_formed.load(Ordering::Relaxed),
            players_matched: c.players_matched.load(Ordering::Relaxed),
            cancels_completed: c.cancels_completed.load(Ordering::Relaxed),
            ticks: c.ticks.load(Ordering::Relaxed),
            active_players: c.active_players.load(Ordering::Relaxed),
        }
    }

    /// Board copy of `id`'s entry, if merged and not yet retired.
    pub fn entry(&self, id: PlayerId) -> Option<MatchEntry> {
        self.tick_state.lock().board.get(id).cloned()
    }

    /// Waiting entries in score order.
    pub fn active_entries(&self) -> Vec<MatchEntry> {
        let guard = self.tick_state.lock();
        let board = &guard.board;
        board
            .by_score()
            .iter()
            .map(|&key| board.entry(key))
            .filter(|entry| !entry.is_settled())
            .cloned()
            .collect()
    }

    /// Waiting player ids, oldest registration first.
    pub fn arrival_order(&self) -> Vec<PlayerId> {
        let guard = self.tick_state.lock();
        let board = &guard.board;
        board
            .by_arrival()
            .iter()
            .map(|&key| board.entry(key))
            .filter(|entry| !entry.is_settled())
            .map(|entry| entry.id)
            .collect()
    }

    /// SHA-256 of the board views.
    pub fn board_digest(&self) -> [u8; 32] {
        self.tick_state.lock().board.digest()
    }

    pub fn board_digest_hex(&self) -> String {
        hex::encode(self.board_digest())
    }

    /// Check the board's view invariants.
    pub fn verify_board(&self) -> Result<(), String> {
        self.tick_state.lock().board.check_invariants()
    }

    /// Registered players across all shards.
    pub fn registered_players(&self) -> usize {
        self.shards.iter().map(|shard| shard.player_count()).sum()
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

impl Service for MatchmakingEngine {
    fn name(&self) -> &'static str {
        "matchmaking"
    }

    fn start(&self) {
        if self.state.advance(Phase::Starting) {
            tracing::info!(
                shards = self.config.shard_count,
                room_size = self.config.room_size,
                tick_ms = self.config.tick_period_ms,
                "matchmaking starting"
            );
        }
    }

    fn started(&self) {
        if self.state.advance(Phase::Running) {
            tracing::info!("matchmaking running");
        }
    }

    fn stop_requested(&self) {
        if self.state.advance(Phase::Stopping) {
            tracing::info!("matchmaking stopping");
        }
    }

    fn stopped(&self) {
        if self.state.advance(Phase::Stopped) {
            tracing::info!(stats = ?self.stats(), "matchmaking stopped");
        }
    }
}

impl TimerTask for MatchmakingEngine {
    fn timer_id(&self) -> TimerId {
        MATCHMAKING_TIMER
    }

    fn period(&self) -> Duration {
        self.config.tick_period()
    }

    fn on_timer(&self) {
        self.tick();
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notify::{ChannelNotifier, MatchEvent, NoopNotifier};
    use crate::types::Room;

    fn running(room_size: usize, clock: Arc<ManualClock>) -> MatchmakingEngine {
        let config = MatchmakingConfig::default().with_room_size(room_size);
        let engine = MatchmakingEngine::new(config, clock, Arc::new(NoopNotifier)).unwrap();
        engine.start();
        engine.started();
        engine
    }

    #[test]
    fn test_requests_rejected_outside_running_window() {
        let config = MatchmakingConfig::default();
        let clock = Arc::new(ManualClock::at_secs(0));
        let engine = MatchmakingEngine::new(config, clock, Arc::new(NoopNotifier)).unwrap();

        assert_eq!(engine.add(1, 100), Err(MatchError::NotRunning));
        engine.start();
        assert_eq!(engine.add(1, 100), Err(MatchError::NotRunning));
        engine.started();
        assert_eq!(engine.add(1, 100), Ok(()));
        engine.stop_requested();
        assert_eq!(engine.add(2, 100), Err(MatchError::NotRunning));
        assert_eq!(engine.cancel(1), Err(MatchError::NotRunning));
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let engine = running(8, Arc::new(ManualClock::at_secs(0)));

        assert_eq!(engine.add(0, 100), Err(MatchError::InvalidRequest));
        assert_eq!(engine.add(-3, 100), Err(MatchError::InvalidRequest));
        assert_eq!(engine.cancel(0), Err(MatchError::InvalidRequest));
        assert_eq!(engine.player_status(0), None);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = MatchmakingConfig::default().with_shard_count(3);
        let clock = Arc::new(ManualClock::at_secs(0));
        let result = MatchmakingEngine::new(config, clock, Arc::new(NoopNotifier));
        assert!(matches!(result, Err(ConfigError::ShardCount(3))));
    }

    #[test]
    fn test_tick_summary_and_stats() {
        let clock = Arc::new(ManualClock::at_secs(10));
        let engine = running(2, clock.clone());
        engine.add(1, 1000).unwrap();
        engine.add(2, 1100).unwrap();
        engine.add(3, 9000).unwrap();

        let summary = engine.tick();

        assert_eq!(
            summary,
            TickSummary {
                players_added: 3,
                cancels_completed: 0,
                rooms_formed: 1,
                rebuilt: true,
                active_players: 1,
                tick_ms: 0,
            }
        );
        let stats = engine.stats();
        assert_eq!(stats.rooms_formed, 1);
        assert_eq!(stats.players_matched, 2);
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.active_players, 1);
        assert_eq!(engine.player_status(1), Some(PlayerStatus::Matched));
        assert_eq!(engine.player_status(3), Some(PlayerStatus::Waiting));

        // Matched players leave on the next tick
        let summary = engine.tick();
        assert!(summary.rebuilt);
        assert_eq!(engine.player_status(1), None);
        assert_eq!(engine.entry(1), None);
        assert_eq!(engine.registered_players(), 1);
    }

    #[test]
    fn test_deferred_cancel_notifies() {
        let (notifier, rx) = ChannelNotifier::new();
        let clock = Arc::new(ManualClock::at_secs(0));
        let config = MatchmakingConfig::default();
        let engine = MatchmakingEngine::new(config, clock, Arc::new(notifier)).unwrap();
        engine.start();
        engine.started();

        engine.add(5, 100).unwrap();
        engine.tick();
        assert_eq!(engine.cancel(5), Ok(CancelOutcome::Deferred));
        let summary = engine.tick();

        assert_eq!(summary.cancels_completed, 1);
        assert_eq!(rx.try_recv(), Ok(MatchEvent::CancelCompleted(5)));
        assert_eq!(engine.stats().cancels_completed, 1);
        assert!(engine.active_entries().is_empty());
    }

    /// Reads engine state from inside every callback and advances the clock.
    struct Reentrant {
        engine: parking_lot::Mutex<std::sync::Weak<MatchmakingEngine>>,
        clock: Arc<ManualClock>,
        seen: parking_lot::Mutex<Vec<(PlayerId, usize)>>,
    }

    impl Reentrant {
        fn observe(&self, id: PlayerId) {
            let Some(engine) = self.engine.lock().upgrade() else {
                return;
            };
            let _ = engine.board_digest();
            let waiting = engine.active_entries().len();
            self.seen.lock().push((id, waiting));
            self.clock.advance_millis(7);
        }
    }

    impl MatchNotifier for Reentrant {
        fn notify_matched(&self, room: &Room) {
            self.observe(room.id as PlayerId);
        }

        fn notify_cancel_completed(&self, entry: &MatchEntry) {
            self.observe(entry.id);
        }
    }

    #[test]
    fn test_notifier_may_query_engine() {
        let clock = Arc::new(ManualClock::at_secs(0));
        let notifier = Arc::new(Reentrant {
            engine: parking_lot::Mutex::new(std::sync::Weak::new()),
            clock: clock.clone(),
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        let config = MatchmakingConfig::default().with_room_size(2);
        let engine = Arc::new(MatchmakingEngine::new(config, clock, notifier.clone()).unwrap());
        *notifier.engine.lock() = Arc::downgrade(&engine);
        engine.start();
        engine.started();

        engine.add(1, 1000).unwrap();
        engine.add(2, 1000).unwrap();
        engine.add(3, 50_000).unwrap();
        engine.tick();
        assert_eq!(engine.cancel(3), Ok(CancelOutcome::Deferred));

        let summary = engine.tick();

        assert_eq!(summary.cancels_completed, 1);
        assert_eq!(notifier.seen.lock().len(), 2);
        // Time spent in callbacks counts toward the pass
        assert_eq!(summary.tick_ms, 7);
    }

    #[test]
    fn test_timer_task_identity() {
        let engine = running(8, Arc::new(ManualClock::at_secs(0)));
        assert_eq!(engine.timer_id(), MATCHMAKING_TIMER);
        assert_eq!(engine.period(), Duration::from_millis(1_000));

        engine.on_timer();
        assert_eq!(engine.stats().ticks, 1);
    }
}
