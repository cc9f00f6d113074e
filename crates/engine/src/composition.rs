use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::segment::{Segment, SegmentMedia};
use crate::time::MediaTime;

/// Shared handle to a published, immutable anchor snapshot.
pub type SnapshotHandle = Arc<CompositionSnapshot>;

/// One segment placed inside a composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionEntry {
    pub media: Arc<SegmentMedia>,
    pub sequence: u64,
    /// Offset of this entry from the composition start.
    pub insert_at: MediaTime,
    pub duration: MediaTime,
}

/// Growing, append-only timeline owned by one anchor.
///
/// Never truncated; the anchor replaces it wholesale on reset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    anchor_offset: usize,
    start_time: MediaTime,
    first_sequence: u64,
    entries: Vec<CompositionEntry>,
    duration: MediaTime,
}

impl Composition {
    /// Starts an empty composition whose first entry will be `first_sequence`
    /// beginning at content time `start_time`.
    pub fn new(anchor_offset: usize, start_time: MediaTime, first_sequence: u64) -> Self {
        Self {
            anchor_offset,
            start_time,
            first_sequence,
            entries: Vec::new(),
            duration: MediaTime::ZERO,
        }
    }

    pub fn anchor_offset(&self) -> usize {
        self.anchor_offset
    }

    pub fn start_time(&self) -> MediaTime {
        self.start_time
    }

    pub fn first_sequence(&self) -> u64 {
        self.first_sequence
    }

    pub fn duration(&self) -> MediaTime {
        self.duration
    }

    pub fn entries(&self) -> &[CompositionEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence number the next appended segment must carry.
    pub fn next_sequence(&self) -> u64 {
        self.first_sequence + self.entries.len() as u64
    }

    /// Appends `segment` at the current end. Backends call this after their
    /// own validation.
    pub fn push_segment(&mut self, segment: &Segment, sequence: u64) {
        self.entries.push(CompositionEntry {
            media: Arc::clone(&segment.media),
            sequence,
            insert_at: self.duration,
            duration: segment.duration,
        });
        self.duration += segment.duration;
    }

    /// Freezes the current entries into an independent snapshot.
    pub fn freeze(&self) -> CompositionSnapshot {
        CompositionSnapshot {
            anchor_offset: self.anchor_offset,
            start_time: self.start_time,
            first_sequence: self.first_sequence,
            last_sequence: self.next_sequence().saturating_sub(1),
            duration: self.duration,
            entries: Arc::from(self.entries.as_slice()),
        }
    }
}

/// Immutable copy of an anchor's composition handed to playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionSnapshot {
    pub anchor_offset: usize,
    pub start_time: MediaTime,
    pub first_sequence: u64,
    pub last_sequence: u64,
    pub duration: MediaTime,
    pub entries: Arc<[CompositionEntry]>,
}

impl CompositionSnapshot {
    pub fn end_time(&self) -> MediaTime {
        self.start_time + self.duration
    }

    pub fn covers_sequence(&self, sequence: u64) -> bool {
        !self.entries.is_empty() && (self.first_sequence..=self.last_sequence).contains(&sequence)
    }

    pub fn segment_count(&self) -> usize {
        self.entries.len()
    }

    /// Finds the entry playing at `local_offset` and the offset inside it.
    ///
    /// # Example
    /// ```
    /// use replay_engine::{Composition, MediaTime, Segment};
    ///
    /// let mut composition = Composition::new(0, MediaTime::ZERO, 0);
    /// composition.push_segment(&Segment::video(MediaTime::from_seconds(1), 16, 9), 0);
    /// composition.push_segment(&Segment::video(MediaTime::from_seconds(1), 16, 9), 1);
    ///
    /// let snapshot = composition.freeze();
    /// let (entry, within) = snapshot
    ///     .entry_at(MediaTime::from_millis(1_250))
    ///     .expect("inside the composition");
    /// assert_eq!(entry.sequence, 1);
    /// assert_eq!(within, MediaTime::from_millis(250));
    /// ```
    pub fn entry_at(&self, local_offset: MediaTime) -> Option<(&CompositionEntry, MediaTime)> {
        if local_offset < MediaTime::ZERO || local_offset >= self.duration {
            return None;
        }
        let index = self
            .entries
            .partition_point(|entry| entry.insert_at + entry.duration <= local_offset);
        let entry = self.entries.get(index)?;
        Some((entry, local_offset - entry.insert_at))
    }
}

/// Media operations the composition bank performs per anchor.
///
/// Failures are recovered per anchor by the bank; they never abort an
/// ingest as a whole.
pub trait CompositionBackend {
    /// Appends `segment` (global sequence `sequence`) at the end of
    /// `composition`.
    fn append(
        &mut self,
        composition: &mut Composition,
        segment: &Segment,
        sequence: u64,
    ) -> Result<()>;

    /// Produces the immutable snapshot to publish for `composition`.
    fn snapshot(&mut self, composition: &Composition) -> Result<CompositionSnapshot>;
}

/// In-process backend: compositions are lists of shared segment references.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryBackend;

impl CompositionBackend for InMemoryBackend {
    fn append(
        &mut self,
        composition: &mut Composition,
        segment: &Segment,
        sequence: u64,
    ) -> Result<()> {
        if segment.media.video.is_none() {
            return Err(EngineError::AppendFailed {
                offset: composition.anchor_offset(),
                reason: "segment has no video track".to_string(),
            });
        }
        if sequence != composition.next_sequence() {
            return Err(EngineError::AppendFailed {
                offset: composition.anchor_offset(),
                reason: format!(
                    "sequence {sequence} does not follow {}",
                    composition.next_sequence()
                ),
            });
        }
        composition.push_segment(segment, sequence);
        Ok(())
    }

    fn snapshot(&mut self, composition: &Composition) -> Result<CompositionSnapshot> {
        if composition.is_empty() {
            return Err(EngineError::SnapshotFailed {
                offset: composition.anchor_offset(),
                reason: "composition is empty".to_string(),
            });
        }
        Ok(composition.freeze())
    }
}
