//! Intake storage: node pool and sharded store.
//!
//! ## Components
//!
//! - [`EntryPool`]: free list of retired entries, one per shard
//! - [`Shard`]: lock-protected player map plus the four work queues
//! - [`ShardSet`]: fixed power-of-two array of shards addressed by id mask
//!
//! ## Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | Register | O(1) |
//! | Cancel (deferred) | O(1) |
//! | Cancel (direct) | O(k), k = shard's pending adds |
//! | Drain | O(queued work) |

pub mod pool;
pub mod store;

pub use pool::EntryPool;
pub use store::{PlayerStatus, Retirement, Shard, ShardSet};
