//! Core data types for the matchmaking engine
//!
//! ## Types
//!
//! - [`MatchEntry`]: One player's registration
//! - [`Room`]: A finalized group of mutually compatible players
//! - [`ToleranceTable`]: Wait-time dependent score half-width
//! - [`MatchError`] / [`CancelOutcome`]: Intake results
//! - [`ConfigError`]: Rejected configuration

mod entry;
mod error;
mod room;
pub mod tolerance;

pub use entry::{is_valid_player_id, score_order, MatchEntry, PlayerId, Score};
pub use error::{CancelOutcome, ConfigError, MatchError};
pub use room::{Room, RoomId, RoomMember};
pub use tolerance::{ToleranceStep, ToleranceTable};
