//! Outbound notification ports.
//!
//! The engine reports results through a [`MatchNotifier`]. Delivery is
//! fire-and-forget: implementations must not block the tick and the engine
//! does not retry.

use crossbeam_channel::{Receiver, Sender};

use crate::types::{MatchEntry, PlayerId, Room};

/// Receiver of matchmaking results.
///
/// Called from the tick after the board lock is released, so implementations
/// may query the engine.
pub trait MatchNotifier: Send + Sync {
    /// A room formed; every member should be told.
    fn notify_matched(&self, room: &Room);

    /// A deferred cancel completed before the player was matched.
    fn notify_cancel_completed(&self, entry: &MatchEntry);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl MatchNotifier for NoopNotifier {
    fn notify_matched(&self, _room: &Room) {}

    fn notify_cancel_completed(&self, _entry: &MatchEntry) {}
}

/// Event forwarded by [`ChannelNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    Matched(Room),
    CancelCompleted(PlayerId),
}

/// Forwards notifications over an unbounded channel.
///
/// Sends never block; if the receiver is gone the event is dropped.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<MatchEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, Receiver<MatchEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl MatchNotifier for ChannelNotifier {
    fn notify_matched(&self, room: &Room) {
        if self.tx.send(MatchEvent::Matched(room.clone())).is_err() {
            tracing::trace!(room = room.id, "match notification dropped");
        }
    }

    fn notify_cancel_completed(&self, entry: &MatchEntry) {
        if self.tx.send(MatchEvent::CancelCompleted(entry.id)).is_err() {
            tracing::trace!(player = entry.id, "cancel notification dropped");
        }
    }
}
