//! A formed room: exactly `room_size` mutually compatible players.

use crate::types::{MatchEntry, PlayerId, Score};

/// Monotonic room identifier, starting at 1.
pub type RoomId = u64;

/// Snapshot of a member at the moment the room formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomMember {
    pub id: PlayerId,
    pub point: Score,
    pub point_bound: Score,
    pub registered_at: u64,
}

impl From<&MatchEntry> for RoomMember {
    fn from(entry: &MatchEntry) -> Self {
        Self {
            id: entry.id,
            point: entry.point,
            point_bound: entry.point_bound,
            registered_at: entry.registered_at,
        }
    }
}

impl RoomMember {
    #[inline]
    fn accepts(&self, point: Score) -> bool {
        point >= self.point.saturating_sub(self.point_bound)
            && point <= self.point.saturating_add(self.point_bound)
    }
}

/// A finalized room.
///
/// Members are listed in the order they were admitted; the seed (the
/// longest-waiting player the room was built around) comes last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub members: Vec<RoomMember>,
}

impl Room {
    pub fn new(id: RoomId, members: Vec<RoomMember>) -> Self {
        Self { id, members }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The player the room was built around.
    pub fn seed(&self) -> Option<&RoomMember> {
        self.members.last()
    }

    pub fn member_ids(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.members.iter().map(|m| m.id)
    }

    /// Integer average of member scores (0 for an empty room).
    pub fn average_point(&self) -> Score {
        if self.members.is_empty() {
            return 0;
        }
        let sum: i128 = self.members.iter().map(|m| m.point as i128).sum();
        (sum / self.members.len() as i128) as Score
    }

    /// Every pair of members accepts each other's score.
    pub fn is_mutually_compatible(&self) -> bool {
        self.members.iter().enumerate().all(|(i, a)| {
            self.members[i + 1..]
                .iter()
                .all(|b| a.accepts(b.point) && b.accepts(a.point))
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
