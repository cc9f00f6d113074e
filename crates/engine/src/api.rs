use std::sync::{Arc, mpsc};

use tracing::{debug, info, warn};

use crate::bank::CompositionBank;
use crate::clock::TimelineClock;
use crate::composition::CompositionBackend;
use crate::config::BufferConfig;
use crate::error::{EngineError, Result};
use crate::lookup::{BufferState, BufferView};
use crate::segment::Segment;
use crate::store::{SegmentStore, SlotRecord};
use crate::time::MediaTime;

/// Mutations accepted by the buffer worker, applied strictly in order.
#[derive(Debug)]
pub enum Command {
    /// Appends one segment that finished at device time `device_now`.
    Ingest {
        segment: Segment,
        device_now: MediaTime,
    },
    /// Drops every slot, anchor and clock value.
    Reset,
    /// Shifts the live-edge offset by `delta` without a new segment.
    AdjustLiveEdgeOffset { delta: MediaTime },
    /// Acknowledged once every earlier command has been applied.
    Flush { done: mpsc::Sender<()> },
}

/// Events emitted by the buffer worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SegmentIngested {
        sequence: u64,
        slot: usize,
        start_time: MediaTime,
        duration: MediaTime,
    },
    AnchorReset {
        offset: usize,
        sequence: u64,
    },
    LiveEdgeAdjusted {
        live_edge_offset: MediaTime,
    },
    BufferReset,
    Error(EngineErrorEvent),
}

/// Error category carried by [`EngineErrorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    InvalidSegment,
    AnchorNotFound,
    AnchorTrackMissing,
    AppendFailed,
    SnapshotFailed,
    Other,
}

impl From<&EngineError> for EngineErrorKind {
    fn from(value: &EngineError) -> Self {
        match value {
            EngineError::InvalidSegment { .. } => Self::InvalidSegment,
            EngineError::AnchorNotFound { .. } => Self::AnchorNotFound,
            EngineError::AnchorTrackMissing { .. } => Self::AnchorTrackMissing,
            EngineError::AppendFailed { .. } => Self::AppendFailed,
            EngineError::SnapshotFailed { .. } => Self::SnapshotFailed,
            _ => Self::Other,
        }
    }
}

/// Reported error payload emitted as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineErrorEvent {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineErrorEvent {
    pub fn from_error(error: &EngineError) -> Self {
        Self {
            kind: EngineErrorKind::from(error),
            message: error.to_string(),
        }
    }
}

/// Playback layer told to let go of every snapshot after a reset.
///
/// Snapshots it still holds stay valid; the buffer just no longer
/// references them.
pub trait PlaybackConsumer {
    fn stop(&mut self);
    fn clear_queue(&mut self);
    fn mark_state_unknown(&mut self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPlaybackConsumer;

impl PlaybackConsumer for NoopPlaybackConsumer {
    fn stop(&mut self) {}

    fn clear_queue(&mut self) {}

    fn mark_state_unknown(&mut self) {}
}

/// Segment store, composition bank and timeline clock, mutated together.
///
/// Owned by exactly one worker; every command runs to completion before
/// the next starts.
#[derive(Debug)]
pub struct BufferCore<B> {
    config: BufferConfig,
    store: SegmentStore,
    bank: CompositionBank<B>,
    clock: TimelineClock,
    state: BufferState,
}

impl<B> BufferCore<B>
where
    B: CompositionBackend,
{
    pub fn new(config: BufferConfig, backend: B) -> Result<Self> {
        let bank = CompositionBank::new(&config, backend)?;
        Ok(Self {
            config,
            store: SegmentStore::new(config.max_buffer_size),
            bank,
            clock: TimelineClock::new(),
            state: BufferState::Empty,
        })
    }

    /// Applies one command and returns emitted events.
    ///
    /// `Err` means the command changed nothing (an invalid segment).
    /// Anchor-level failures are returned as `Event::Error` alongside a
    /// successful ingest.
    pub fn handle_command(&mut self, command: Command) -> Result<Vec<Event>> {
        match command {
            Command::Ingest {
                segment,
                device_now,
            } => self.ingest(segment, device_now),
            Command::Reset => Ok(self.reset()),
            Command::AdjustLiveEdgeOffset { delta } => Ok(self.adjust_live_edge_offset(delta)),
            Command::Flush { done } => {
                let _ = done.send(());
                Ok(Vec::new())
            }
        }
    }

    fn ingest(&mut self, segment: Segment, device_now: MediaTime) -> Result<Vec<Event>> {
        if let Err(error) = segment.validate() {
            warn!(%error, "segment rejected");
            return Err(error);
        }

        let sequence = self.clock.segment_counter();
        let slot = self.config.slot_for_sequence(sequence);
        let start_time = self.clock.advance(segment.duration, device_now);
        let outcome = self.bank.ingest(&segment, slot, sequence, start_time);

        self.store.set_slot(
            slot,
            SlotRecord {
                sequence,
                start_time,
                duration: segment.duration,
                snapshot: outcome.published_for(slot).cloned(),
            },
        );
        for snapshot in &outcome.published {
            if snapshot.anchor_offset != slot {
                self.store
                    .publish_snapshot(snapshot.anchor_offset, Arc::clone(snapshot));
            }
        }
        let earliest = self.clock.recompute_earliest(&self.store, slot);
        self.update_state();

        debug!(
            sequence,
            slot,
            %start_time,
            %earliest,
            published = outcome.published.len(),
            failures = outcome.failures.len(),
            "segment ingested"
        );

        let mut events = vec![Event::SegmentIngested {
            sequence,
            slot,
            start_time,
            duration: segment.duration,
        }];
        if let Some(offset) = outcome.reset {
            events.push(Event::AnchorReset { offset, sequence });
        }
        events.extend(
            outcome
                .failures
                .iter()
                .map(|error| Event::Error(EngineErrorEvent::from_error(error))),
        );
        Ok(events)
    }

    fn reset(&mut self) -> Vec<Event> {
        let discarded = self.clock.segment_counter();
        self.store.clear_all();
        self.bank.reset_all();
        self.clock.reset();
        self.update_state();
        info!(discarded, "buffer reset");
        vec![Event::BufferReset]
    }

    fn adjust_live_edge_offset(&mut self, delta: MediaTime) -> Vec<Event> {
        self.clock.adjust_offset(delta);
        let live_edge_offset = self.clock.live_edge_offset();
        info!(%delta, %live_edge_offset, "live edge offset adjusted");
        vec![Event::LiveEdgeAdjusted { live_edge_offset }]
    }

    fn update_state(&mut self) {
        let next = BufferState::for_count(self.clock.segment_counter(), self.config.max_buffer_size);
        if next != self.state {
            info!(from = ?self.state, to = ?next, "buffer state changed");
            self.state = next;
        }
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn clock(&self) -> &TimelineClock {
        &self.clock
    }

    /// Copies the published state for readers.
    pub fn view(&self) -> BufferView {
        BufferView {
            state: self.state,
            segment_count: self.clock.segment_counter(),
            next_start_time: self.clock.next_start_time(),
            live_edge_offset: self.clock.live_edge_offset(),
            earliest_available_time: self.clock.earliest_available_time(),
            slots: self.store.slots().to_vec(),
            anchors: self.bank.statuses(),
        }
    }
}
