// id.rs — Stable identifiers for grammar entities
//
// Tracks are addressed by position. Loop nests are composed from the last
// track inward, so callers iterate `TrackId`s in both directions.

use std::fmt;

/// Position of an input sequence axis, `0..T`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackId(pub usize);

impl TrackId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "track {}", self.0)
    }
}

/// All track ids of a grammar with `count` tracks, in ascending order.
pub fn track_ids(count: usize) -> impl DoubleEndedIterator<Item = TrackId> {
    (0..count).map(TrackId)
}
