//! Playback schedule cursor
//!
//! Each inbound chunk starts at `max(now, next_start)` and pushes `next_start`
//! forward by its duration, so chunks play back to back in arrival order
//! without overlapping.

/// Earliest start time for the next inbound chunk
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackCursor {
    next_start: f64,
}

impl PlaybackCursor {
    /// Create a cursor at time zero
    #[must_use]
    pub const fn new() -> Self {
        Self { next_start: 0.0 }
    }

    /// Reserve `duration` seconds of playback given the clock reads `now`
    ///
    /// Returns the start time for the chunk.
    pub fn schedule(&mut self, now: f64, duration: f64) -> f64 {
        let start = self.next_start.max(now);
        self.next_start = start + duration.max(0.0);
        start
    }

    /// Earliest start time for the next chunk
    #[must_use]
    pub const fn next_start(&self) -> f64 {
        self.next_start
    }

    /// Rewind to time zero for a fresh playback clock
    pub const fn reset(&mut self) {
        self.next_start = 0.0;
    }
}
