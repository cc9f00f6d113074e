use crate::composition::SnapshotHandle;
use crate::time::MediaTime;

/// Everything recorded for one buffer position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRecord {
    /// Global index of the segment occupying this slot.
    pub sequence: u64,
    pub start_time: MediaTime,
    pub duration: MediaTime,
    /// Only anchor slots carry a snapshot, covering that anchor's
    /// composition from this slot up to the newest segment.
    pub snapshot: Option<SnapshotHandle>,
}

impl SlotRecord {
    pub fn end_time(&self) -> MediaTime {
        self.start_time + self.duration
    }

    pub fn contains(&self, time: MediaTime) -> bool {
        self.start_time <= time && time < self.end_time()
    }
}

/// Fixed-capacity circular slot array. Pure storage; callers compute slot
/// indices modulo the capacity.
#[derive(Debug, Clone, Default)]
pub struct SegmentStore {
    slots: Vec<Option<SlotRecord>>,
}

impl SegmentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn set_slot(&mut self, index: usize, record: SlotRecord) {
        self.slots[index] = Some(record);
    }

    /// Replaces the snapshot of an already recorded slot. Ignored for empty
    /// slots.
    pub fn publish_snapshot(&mut self, index: usize, snapshot: SnapshotHandle) {
        if let Some(record) = self.slots[index].as_mut() {
            record.snapshot = Some(snapshot);
        }
    }

    pub fn get_slot(&self, index: usize) -> Option<&SlotRecord> {
        self.slots.get(index)?.as_ref()
    }

    pub fn clear_all(&mut self) {
        self.slots.fill(None);
    }

    /// Populated slots oldest-first, starting just after `cursor` (the slot
    /// written last).
    pub fn iter_from_oldest(&self, cursor: usize) -> impl Iterator<Item = &SlotRecord> {
        let capacity = self.slots.len();
        (1..=capacity)
            .map(move |step| (cursor + step) % capacity)
            .filter_map(move |index| self.slots[index].as_ref())
    }

    pub fn slots(&self) -> &[Option<SlotRecord>] {
        &self.slots
    }
}
