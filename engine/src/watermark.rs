//! The global `lastChecked` cursor.
//!
//! The watermark only ever moves forward. It is raised from persisted data on
//! a cold-start restore and set to "now" after a pull that succeeded for every
//! collection.

use crate::{Collection, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark(Timestamp);

impl Watermark {
    /// Starts at the Unix epoch.
    pub fn new() -> Self {
        Self(Timestamp::epoch())
    }

    pub fn get(&self) -> Timestamp {
        self.0
    }

    /// Raise to `candidate` if it is strictly later. Returns whether it moved.
    pub fn raise(&mut self, candidate: Timestamp) -> bool {
        if candidate > self.0 {
            self.0 = candidate;
            true
        } else {
            false
        }
    }

    /// Back to the epoch. Only a wipe does this.
    pub fn reset(&mut self) {
        self.0 = Timestamp::epoch();
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::new()
    }
}

/// The watermark a restored collection supports.
///
/// Synced records vouch for everything up to their newest timestamp. A
/// collection holding only queued records falls back to the timestamp of the
/// last queued record in collection order.
pub fn restore_candidate(collection: &Collection) -> Option<Timestamp> {
    let (synced, queued): (Vec<_>, Vec<_>) =
        collection.records().iter().partition(|r| !r.is_queued());

    if !synced.is_empty() {
        return synced
            .iter()
            .filter_map(|r| collection.timestamp_of(r))
            .max();
    }
    queued.last().and_then(|r| collection.timestamp_of(r))
}
