use crate::store::SegmentStore;
use crate::time::MediaTime;

/// Content-time bookkeeping for the buffer.
///
/// `content_now = device_now + live_edge_offset` tracks the end of the most
/// recently ingested segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineClock {
    segment_counter: u64,
    next_start_time: MediaTime,
    live_edge_offset: MediaTime,
    earliest_available_time: MediaTime,
}

impl TimelineClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of segments ingested since the last reset.
    pub fn segment_counter(&self) -> u64 {
        self.segment_counter
    }

    pub fn next_start_time(&self) -> MediaTime {
        self.next_start_time
    }

    pub fn live_edge_offset(&self) -> MediaTime {
        self.live_edge_offset
    }

    pub fn earliest_available_time(&self) -> MediaTime {
        self.earliest_available_time
    }

    pub fn content_now(&self, device_now: MediaTime) -> MediaTime {
        device_now + self.live_edge_offset
    }

    /// Claims the next start time for a segment of `duration` that finished
    /// at `device_now`, and returns it.
    ///
    /// # Example
    /// ```
    /// use replay_engine::{MediaTime, TimelineClock};
    ///
    /// let mut clock = TimelineClock::new();
    /// let start = clock.advance(MediaTime::from_seconds(1), MediaTime::from_seconds(100));
    /// assert_eq!(start, MediaTime::ZERO);
    /// assert_eq!(clock.content_now(MediaTime::from_seconds(100)), MediaTime::from_seconds(1));
    /// ```
    pub fn advance(&mut self, duration: MediaTime, device_now: MediaTime) -> MediaTime {
        let start = self.next_start_time;
        self.next_start_time += duration;
        self.segment_counter += 1;
        self.live_edge_offset = self.next_start_time - device_now;
        start
    }

    /// Shifts the live edge without touching content time, e.g. to absorb
    /// the device-clock gap of a suspension.
    pub fn adjust_offset(&mut self, delta: MediaTime) {
        self.live_edge_offset += delta;
    }

    /// Scans slots oldest-first from just after `cursor` and records the
    /// start of the first slot holding a snapshot, or zero when none does.
    pub fn recompute_earliest(&mut self, store: &SegmentStore, cursor: usize) -> MediaTime {
        self.earliest_available_time = store
            .iter_from_oldest(cursor)
            .find(|slot| slot.snapshot.is_some())
            .map_or(MediaTime::ZERO, |slot| slot.start_time);
        self.earliest_available_time
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
