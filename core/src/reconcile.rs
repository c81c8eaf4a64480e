//! Read reconciliation: which message indices to fetch for a given count,
//! single-flight bookkeeping for the two polling reads, and per-episode
//! debouncing of read errors.

use std::ops::Range;

/// Default number of most recent messages shown.
pub const DEFAULT_PAGE_SIZE: u64 = 8;

/// Suffix window `[max(0, count - page_size), count)`. Empty for `count == 0`.
#[must_use]
pub fn read_window(count: u64, page_size: u64) -> Range<u64> {
    count.saturating_sub(page_size)..count
}

/// Single-flight state of one read kind.
///
/// Poll ticks call `try_start` and are dropped while a read is outstanding.
/// Forced reads (after a confirmation, after a count change) call `request`
/// and are queued behind the outstanding one so they are never lost.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadSlot {
    in_flight: bool,
    queued: bool,
}

impl ReadSlot {
    /// Start a read unless one is in flight.
    pub fn try_start(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Start a read now, or queue exactly one follow-up.
    pub fn request(&mut self) -> bool {
        if self.in_flight {
            self.queued = true;
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Mark the outstanding read finished. Returns true if a queued read
    /// should be issued immediately (the slot stays in flight for it).
    pub fn finish(&mut self) -> bool {
        if self.queued {
            self.queued = false;
            return true;
        }
        self.in_flight = false;
        false
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Tracks one failure episode of a polling read: the first failure is
/// reported, repeats are swallowed until a success closes the episode.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEpisode {
    reported: bool,
}

impl ErrorEpisode {
    /// Returns true if this failure opens a new episode and should be shown.
    pub fn failure(&mut self) -> bool {
        !std::mem::replace(&mut self.reported, true)
    }

    pub fn success(&mut self) {
        self.reported = false;
    }

    pub fn is_open(&self) -> bool {
        self.reported
    }
}
