//! Engine configuration.
//!
//! Fixed at construction; nothing here is reloaded at runtime.
//!
//! Environment variables read by [`MatchmakingConfig::from_env`]:
//! - `MATCH_SHARD_COUNT` (default: 8, power of two)
//! - `MATCH_ROOM_SIZE` (default: 8)
//! - `MATCH_TICK_PERIOD_MS` (default: 1000)
//! - `MATCH_SHARD_CAPACITY` (default: 100)
//! - `MATCH_TOLERANCE` (default: `10:500,20:1000,30:1500,40:2000`)

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ConfigError, ToleranceTable};

/// Matchmaking engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingConfig {
    /// Number of intake shards (power of two)
    pub shard_count: usize,

    /// Players per room
    pub room_size: usize,

    /// Interval between ticks in milliseconds
    pub tick_period_ms: u64,

    /// Initial per-shard queue capacity
    pub shard_capacity: usize,

    /// Score half-width by wait time
    pub tolerance: ToleranceTable,
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            shard_count: 8,
            room_size: 8,
            tick_period_ms: 1_000,
            shard_capacity: 100,
            tolerance: ToleranceTable::default(),
        }
    }
}

impl MatchmakingConfig {
    /// Load from `MATCH_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let tolerance = match env::var("MATCH_TOLERANCE") {
            Ok(raw) => ToleranceTable::parse(&raw).ok_or(ConfigError::InvalidEnv {
                key: "MATCH_TOLERANCE",
                value: raw,
            })?,
            Err(_) => defaults.tolerance,
        };

        let cfg = Self {
            shard_count: env_parse("MATCH_SHARD_COUNT", defaults.shard_count)?,
            room_size: env_parse("MATCH_ROOM_SIZE", defaults.room_size)?,
            tick_period_ms: env_parse("MATCH_TICK_PERIOD_MS", defaults.tick_period_ms)?,
            shard_capacity: env_parse("MATCH_SHARD_CAPACITY", defaults.shard_capacity)?,
            tolerance,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.shard_count.is_power_of_two() {
            return Err(ConfigError::ShardCount(self.shard_count));
        }
        if self.room_size < 2 {
            return Err(ConfigError::RoomSize(self.room_size));
        }
        if self.tick_period_ms == 0 {
            return Err(ConfigError::TickPeriod);
        }
        Ok(())
    }

    #[inline]
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn with_room_size(mut self, room_size: usize) -> Self {
        self.room_size = room_size;
        self
    }

    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count;
        self
    }

    pub fn with_tick_period_ms(mut self, tick_period_ms: u64) -> Self {
        self.tick_period_ms = tick_period_ms;
        self
    }

    pub fn with_tolerance(mut self, tolerance: ToleranceTable) -> Self {
        self.tolerance = tolerance;
        self
    }
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv { key, value: raw }),
        Err(_) => Ok(default),
    }
}
