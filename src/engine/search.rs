//! Room search over the board.
//!
//! ## Algorithm
//!
//! Seeds are visited oldest first (arrival view). For each unmatched seed the
//! score view is walked outward from the seed's own position, alternating
//! sides: +1, -1, +2, -2, ... A side closes for good once its next candidate
//! lies outside the seed's window (the view is score-sorted, so nothing
//! further out can fit) or the view ends.
//!
//! A candidate is admitted when it accepts the seed's score and is
//! compatible with every member admitted so far. Once `room_size - 1`
//! candidates are in, the seed joins and the room is finalized. A seed that
//! runs out of candidates forms nothing and the members it collected stay
//! available to later seeds.
//!
//! Formed members are flagged `matched` in place; the views are left alone
//! until the next rebuild.

use crate::engine::board::MatchBoard;
use crate::types::{MatchEntry, Room, RoomId, RoomMember};

/// Members collected for one seed.
#[derive(Debug, Default)]
pub struct RoomBuilder {
    /// Slab keys of admitted candidates
    members: Vec<usize>,
}

impl RoomBuilder {
    pub fn with_capacity(room_size: usize) -> Self {
        Self {
            members: Vec::with_capacity(room_size),
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.members.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Candidate fits with everyone already admitted.
    fn fits(&self, board: &MatchBoard, candidate: &MatchEntry) -> bool {
        self.members
            .iter()
            .all(|&key| board.entry(key).compatible_with(candidate))
    }

    fn push(&mut self, key: usize) {
        self.members.push(key);
    }
}

/// Which way a scan step moved from the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Higher,
    Lower,
}

/// Outcome of examining one candidate slot.
enum Probe {
    /// Side is finished
    Closed,
    /// Slot examined, nothing admitted
    Skip,
    /// Candidate admitted at this slab key
    Admit(usize),
}

/// Form every room the board currently allows.
///
/// Room ids are allocated from `next_room_id` upward. Members of formed
/// rooms are flagged `matched`.
pub fn form_rooms(board: &mut MatchBoard, room_size: usize, next_room_id: RoomId) -> Vec<Room> {
    let mut rooms = Vec::new();
    if room_size < 2 || board.len() < room_size {
        return rooms;
    }

    let mut builder = RoomBuilder::with_capacity(room_size);
    for pos in 0..board.by_arrival().len() {
        let seed_key = board.by_arrival()[pos];
        if board.entry(seed_key).matched {
            continue;
        }

        builder.clear();
        if !collect(board, seed_key, room_size, &mut builder) {
            continue;
        }

        builder.push(seed_key);
        let id = next_room_id + rooms.len() as RoomId;
        let mut members = Vec::with_capacity(builder.len());
        for &key in &builder.members {
            let entry = board.entry_mut(key);
            entry.matched = true;
            members.push(RoomMember::from(&*entry));
        }
        tracing::trace!(room = id, seed = board.entry(seed_key).id, "room formed");
        rooms.push(Room::new(id, members));
    }
    rooms
}

/// Zigzag outward from the seed until the builder holds `room_size - 1`
/// candidates or both sides close.
fn collect(
    board: &MatchBoard,
    seed_key: usize,
    room_size: usize,
    builder: &mut RoomBuilder,
) -> bool {
    let needed = room_size - 1;
    let mut higher_open = true;
    let mut lower_open = true;
    let mut offset = 1usize;

    while higher_open || lower_open {
        for side in [Side::Higher, Side::Lower] {
            let open = match side {
                Side::Higher => &mut higher_open,
                Side::Lower => &mut lower_open,
            };
            if !*open {
                continue;
            }
            match probe(board, seed_key, offset, side, builder) {
                Probe::Closed => *open = false,
                Probe::Skip => {}
                Probe::Admit(key) => {
                    builder.push(key);
                    if builder.len() >= needed {
                        return true;
                    }
                }
            }
        }
        offset += 1;
    }
    false
}

fn probe(
    board: &MatchBoard,
    seed_key: usize,
    offset: usize,
    side: Side,
    builder: &RoomBuilder,
) -> Probe {
    let seed = board.entry(seed_key);
    let seed_pos = seed.score_index;
    let view = board.by_score();

    let cand_key = match side {
        Side::Higher => match view.get(seed_pos + offset) {
            Some(&key) => key,
            None => return Probe::Closed,
        },
        Side::Lower => {
            if offset > seed_pos {
                return Probe::Closed;
            }
            view[seed_pos - offset]
        }
    };

    let cand = board.entry(cand_key);
    let outside = match side {
        Side::Higher => seed.window_high() < cand.point,
        Side::Lower => cand.point < seed.window_low(),
    };
    if outside {
        return Probe::Closed;
    }

    if cand.matched || !cand.accepts(seed.point) || !builder.fits(board, cand) {
        return Probe::Skip;
    }
    Probe::Admit(cand_key)
}

// ============================================================================
// Unit Tests
// ============================================================================
