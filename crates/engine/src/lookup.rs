use serde::Serialize;

use crate::bank::AnchorStatus;
use crate::composition::SnapshotHandle;
use crate::store::SlotRecord;
use crate::time::MediaTime;

/// Lifecycle of the buffer. `SteadyState` cycles forever; only a reset
/// leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferState {
    Empty,
    Filling,
    SteadyState,
}

impl BufferState {
    pub fn for_count(segment_count: u64, max_buffer_size: usize) -> Self {
        if segment_count == 0 {
            Self::Empty
        } else if segment_count < max_buffer_size as u64 {
            Self::Filling
        } else {
            Self::SteadyState
        }
    }
}

/// Where playback should seek for one content time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekTarget {
    pub slot: usize,
    pub sequence: u64,
    pub anchor_offset: usize,
    pub snapshot: SnapshotHandle,
    /// Position inside `snapshot`.
    pub local_offset: MediaTime,
}

/// Point-in-time copy of all published buffer state.
///
/// Produced once per applied command; readers share it without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferView {
    pub state: BufferState,
    pub segment_count: u64,
    pub next_start_time: MediaTime,
    pub live_edge_offset: MediaTime,
    pub earliest_available_time: MediaTime,
    pub slots: Vec<Option<SlotRecord>>,
    pub anchors: Vec<AnchorStatus>,
}

/// Serializable summary of a [`BufferView`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BufferStatus {
    pub state: BufferState,
    pub segment_count: u64,
    pub next_start_time: MediaTime,
    pub earliest_available_time: MediaTime,
    pub live_edge_offset: MediaTime,
    pub buffered_seconds: f64,
    pub anchors: Vec<AnchorStatus>,
}

impl BufferView {
    pub fn empty(capacity: usize, anchors: Vec<AnchorStatus>) -> Self {
        Self {
            state: BufferState::Empty,
            segment_count: 0,
            next_start_time: MediaTime::ZERO,
            live_edge_offset: MediaTime::ZERO,
            earliest_available_time: MediaTime::ZERO,
            slots: vec![None; capacity],
            anchors,
        }
    }

    pub fn slot(&self, index: usize) -> Option<&SlotRecord> {
        self.slots.get(index)?.as_ref()
    }

    /// Slot written by the most recent ingest.
    pub fn cursor(&self) -> Option<usize> {
        let capacity = self.slots.len() as u64;
        (self.segment_count > 0 && capacity > 0)
            .then(|| ((self.segment_count - 1) % capacity) as usize)
    }

    /// Populated slots with their indices, oldest first.
    pub fn slots_in_age_order(&self) -> impl Iterator<Item = (usize, &SlotRecord)> {
        let capacity = self.slots.len();
        let cursor = self.cursor().unwrap_or(capacity.saturating_sub(1));
        (1..=capacity)
            .map(move |step| (cursor + step) % capacity)
            .filter_map(move |index| self.slots[index].as_ref().map(|slot| (index, slot)))
    }

    /// Locates `time` inside the playable window.
    ///
    /// Picks the oldest anchor snapshot still covering the containing slot,
    /// which leaves the most room to scrub in both directions. Returns
    /// `None` outside `[earliest_available_time, next_start_time)`.
    pub fn seek_target(&self, time: MediaTime) -> Option<SeekTarget> {
        if self.state == BufferState::Empty
            || time < self.earliest_available_time
            || time >= self.next_start_time
        {
            return None;
        }

        let (slot, record) = self
            .slots_in_age_order()
            .find(|(_, record)| record.contains(time))?;
        let snapshot = self
            .slots_in_age_order()
            .filter_map(|(_, candidate)| candidate.snapshot.as_ref())
            .find(|snapshot| snapshot.covers_sequence(record.sequence))?;

        Some(SeekTarget {
            slot,
            sequence: record.sequence,
            anchor_offset: snapshot.anchor_offset,
            snapshot: SnapshotHandle::clone(snapshot),
            local_offset: time - snapshot.start_time,
        })
    }

    /// Seek target for the last tick of the newest segment.
    pub fn live_seek_target(&self) -> Option<SeekTarget> {
        self.seek_target(self.next_start_time - MediaTime::from_ticks(1))
    }

    pub fn status(&self) -> BufferStatus {
        BufferStatus {
            state: self.state,
            segment_count: self.segment_count,
            next_start_time: self.next_start_time,
            earliest_available_time: self.earliest_available_time,
            live_edge_offset: self.live_edge_offset,
            buffered_seconds: (self.next_start_time - self.earliest_available_time)
                .as_seconds_f64(),
            anchors: self.anchors.clone(),
        }
    }
}
