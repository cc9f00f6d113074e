use std::fmt;
use std::sync::mpsc::{self, TrySendError};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::api::{
    BufferCore, Command, EngineErrorEvent, Event, NoopPlaybackConsumer, PlaybackConsumer,
};
use crate::composition::{CompositionBackend, InMemoryBackend};
use crate::config::BufferConfig;
use crate::error::{EngineError, Result};
use crate::lookup::{BufferState, BufferView, SeekTarget};
use crate::segment::Segment;
use crate::source::{DeviceClock, MonotonicClock};
use crate::store::SlotRecord;
use crate::time::MediaTime;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Receiver for events emitted by the buffer worker.
///
/// Events are dropped, not queued, once it falls
/// `EVENT_CHANNEL_CAPACITY` events behind.
pub type EventReceiver = mpsc::Receiver<Event>;

type ViewCell = RwLock<Arc<BufferView>>;

struct Shared {
    commands: Mutex<Option<mpsc::Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    view: Arc<ViewCell>,
    clock: Arc<dyn DeviceClock>,
    config: BufferConfig,
}

/// Handle to a running replay buffer.
///
/// Writers enqueue commands and return immediately; a single worker thread
/// applies them in order and publishes a fresh [`BufferView`] after each
/// one. Readers only ever see fully applied commands. Clones share the same
/// worker.
#[derive(Clone)]
pub struct ReplayBuffer {
    shared: Arc<Shared>,
}

impl fmt::Debug for ReplayBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayBuffer")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl ReplayBuffer {
    /// Starts the worker thread around `backend`.
    ///
    /// `consumer` is told to stop and drop its queue after every reset.
    pub fn spawn<B, C, P>(
        config: BufferConfig,
        backend: B,
        clock: C,
        consumer: P,
    ) -> Result<(Self, EventReceiver)>
    where
        B: CompositionBackend + Send + 'static,
        C: DeviceClock + 'static,
        P: PlaybackConsumer + Send + 'static,
    {
        let core = BufferCore::new(config, backend)?;
        let view = Arc::new(RwLock::new(Arc::new(core.view())));
        let (command_tx, command_rx) = mpsc::channel::<Command>();
        let (event_tx, event_rx) = mpsc::sync_channel::<Event>(EVENT_CHANNEL_CAPACITY);

        let worker_view = Arc::clone(&view);
        let worker = thread::Builder::new()
            .name("replay-buffer".to_string())
            .spawn(move || run_worker(core, command_rx, event_tx, worker_view, consumer))
            .map_err(|source| EngineError::WorkerSpawn { source })?;

        info!(
            max_buffer_size = config.max_buffer_size,
            composition_spacing = config.composition_spacing,
            anchors = config.anchor_count(),
            "replay buffer started"
        );

        let shared = Shared {
            commands: Mutex::new(Some(command_tx)),
            worker: Mutex::new(Some(worker)),
            view,
            clock: Arc::new(clock),
            config,
        };
        Ok((
            Self {
                shared: Arc::new(shared),
            },
            event_rx,
        ))
    }

    /// In-memory compositions on the monotonic device clock.
    pub fn in_memory(config: BufferConfig) -> Result<(Self, EventReceiver)> {
        Self::spawn(
            config,
            InMemoryBackend,
            MonotonicClock::new(),
            NoopPlaybackConsumer,
        )
    }

    pub fn config(&self) -> &BufferConfig {
        &self.shared.config
    }

    /// Enqueues a finished segment, stamped with the current device time.
    ///
    /// Never blocks on ingest work. Rejections surface as
    /// [`Event::Error`]; `Err` only means the worker is gone.
    pub fn ingest(&self, segment: Segment) -> Result<()> {
        let device_now = self.shared.clock.now();
        self.ingest_at(segment, device_now)
    }

    /// Enqueues a segment that finished at `device_now`.
    pub fn ingest_at(&self, segment: Segment, device_now: MediaTime) -> Result<()> {
        self.send(Command::Ingest {
            segment,
            device_now,
        })
    }

    /// Enqueues a full reset. Queued ingests ahead of it still apply first.
    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    pub fn adjust_live_edge_offset(&self, delta: MediaTime) -> Result<()> {
        self.send(Command::AdjustLiveEdgeOffset { delta })
    }

    /// Blocks until every command enqueued before this call is visible to
    /// readers.
    pub fn flush(&self) -> Result<()> {
        let (done, acked) = mpsc::channel();
        self.send(Command::Flush { done })?;
        acked.recv().map_err(|_| EngineError::EngineStopped)
    }

    /// Stops accepting commands, drains the queue and joins the worker.
    ///
    /// Later calls on any clone fail with [`EngineError::EngineStopped`].
    pub fn shutdown(&self) -> Result<()> {
        drop(
            self.shared
                .commands
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return Ok(());
        };
        worker.join().map_err(|_| EngineError::EngineStopped)?;
        info!("replay buffer stopped");
        Ok(())
    }

    /// Latest published state. Every field comes from the same command.
    pub fn view(&self) -> Arc<BufferView> {
        Arc::clone(
            &self
                .shared
                .view
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    pub fn state(&self) -> BufferState {
        self.view().state
    }

    pub fn current_segment_count(&self) -> u64 {
        self.view().segment_count
    }

    pub fn next_start_time(&self) -> MediaTime {
        self.view().next_start_time
    }

    pub fn earliest_available_time(&self) -> MediaTime {
        self.view().earliest_available_time
    }

    pub fn live_edge_offset(&self) -> MediaTime {
        self.view().live_edge_offset
    }

    /// Content time at the live edge right now.
    pub fn live_edge_now(&self) -> MediaTime {
        self.shared.clock.now() + self.live_edge_offset()
    }

    pub fn lookup_slot(&self, index: usize) -> Option<SlotRecord> {
        self.view().slot(index).cloned()
    }

    /// Slots read from a single view, so they are mutually consistent.
    pub fn lookup_range(&self, indices: impl IntoIterator<Item = usize>) -> Vec<Option<SlotRecord>> {
        let view = self.view();
        indices
            .into_iter()
            .map(|index| view.slot(index).cloned())
            .collect()
    }

    pub fn seek_target(&self, time: MediaTime) -> Option<SeekTarget> {
        self.view().seek_target(time)
    }

    fn send(&self, command: Command) -> Result<()> {
        let commands = self
            .shared
            .commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let sender = commands.as_ref().ok_or(EngineError::EngineStopped)?;
        sender
            .send(command)
            .map_err(|_| EngineError::EngineStopped)
    }
}

fn run_worker<B, P>(
    mut core: BufferCore<B>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::SyncSender<Event>,
    view: Arc<ViewCell>,
    mut consumer: P,
) where
    B: CompositionBackend,
    P: PlaybackConsumer,
{
    while let Ok(command) = commands.recv() {
        let is_reset = matches!(command, Command::Reset);
        let is_flush = matches!(command, Command::Flush { .. });

        let emitted = match core.handle_command(command) {
            Ok(events) => events,
            Err(error) => vec![Event::Error(EngineErrorEvent::from_error(&error))],
        };

        if !is_flush {
            *view.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(core.view());
        }
        if is_reset {
            consumer.stop();
            consumer.clear_queue();
            consumer.mark_state_unknown();
        }
        for event in emitted {
            forward(&events, event);
        }
    }
    debug!("replay buffer worker exiting");
}

fn forward(events: &mpsc::SyncSender<Event>, event: Event) {
    match events.try_send(event) {
        Ok(()) | Err(TrySendError::Disconnected(_)) => {}
        Err(TrySendError::Full(event)) => {
            warn!(?event, "event receiver is behind; event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::ReplayBuffer;
    use crate::api::{EngineErrorKind, Event, PlaybackConsumer};
    use crate::composition::InMemoryBackend;
    use crate::config::BufferConfig;
    use crate::error::EngineError;
    use crate::lookup::BufferState;
    use crate::segment::Segment;
    use crate::source::ManualClock;
    use crate::time::MediaTime;

    #[derive(Clone, Default)]
    struct RecordingConsumer {
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl PlaybackConsumer for RecordingConsumer {
        fn stop(&mut self) {
            self.calls.lock().expect("calls lock").push("stop");
        }

        fn clear_queue(&mut self) {
            self.calls.lock().expect("calls lock").push("clear_queue");
        }

        fn mark_state_unknown(&mut self) {
            self.calls.lock().expect("calls lock").push("mark_state_unknown");
        }
    }

    fn one_second() -> Segment {
        Segment::video(MediaTime::from_seconds(1), 1920, 1080)
    }

    #[test]
    fn ingest_is_visible_after_flush() {
        let clock = ManualClock::new();
        let (buffer, events) = ReplayBuffer::spawn(
            BufferConfig::default(),
            InMemoryBackend,
            clock.clone(),
            RecordingConsumer::default(),
        )
        .expect("spawn");

        clock.set(MediaTime::from_seconds(100));
        buffer.ingest(one_second()).expect("enqueue");
        buffer.flush().expect("flush");

        assert_eq!(buffer.current_segment_count(), 1);
        assert_eq!(buffer.state(), BufferState::Filling);
        assert_eq!(buffer.next_start_time(), MediaTime::from_seconds(1));
        assert_eq!(buffer.live_edge_offset(), MediaTime::from_seconds(-99));
        assert_eq!(buffer.live_edge_now(), MediaTime::from_seconds(1));
        assert!(matches!(
            events.try_recv(),
            Ok(Event::SegmentIngested { sequence: 0, slot: 0, .. })
        ));
        assert!(matches!(
            events.try_recv(),
            Ok(Event::AnchorReset { offset: 0, sequence: 0 })
        ));
    }

    #[test]
    fn rejected_segment_surfaces_as_error_event() {
        let (buffer, events) = ReplayBuffer::in_memory(BufferConfig::default()).expect("spawn");

        buffer
            .ingest(Segment::video(MediaTime::ZERO, 16, 9))
            .expect("enqueue");
        buffer.flush().expect("flush");

        let Ok(Event::Error(error)) = events.try_recv() else {
            panic!("expected an error event");
        };
        assert_eq!(error.kind, EngineErrorKind::InvalidSegment);
        assert_eq!(buffer.current_segment_count(), 0);
        assert_eq!(buffer.state(), BufferState::Empty);
    }

    #[test]
    fn reset_notifies_the_playback_consumer_in_order() {
        let consumer = RecordingConsumer::default();
        let calls = Arc::clone(&consumer.calls);
        let (buffer, _events) = ReplayBuffer::spawn(
            BufferConfig::default(),
            InMemoryBackend,
            ManualClock::new(),
            consumer,
        )
        .expect("spawn");

        for _ in 0..3 {
            buffer.ingest(one_second()).expect("enqueue");
        }
        buffer.reset().expect("enqueue reset");
        buffer.flush().expect("flush");

        assert_eq!(
            *calls.lock().expect("calls lock"),
            vec!["stop", "clear_queue", "mark_state_unknown"]
        );
        assert_eq!(buffer.state(), BufferState::Empty);
        assert!(buffer.lookup_range(0..45).iter().all(Option::is_none));
    }

    #[test]
    fn shutdown_stops_every_clone() {
        let (buffer, _events) = ReplayBuffer::in_memory(BufferConfig::default()).expect("spawn");
        let other = buffer.clone();
        buffer.ingest(one_second()).expect("enqueue");

        buffer.shutdown().expect("shutdown");

        assert_eq!(other.current_segment_count(), 1);
        assert!(matches!(
            other.ingest(one_second()),
            Err(EngineError::EngineStopped)
        ));
        assert!(matches!(other.flush(), Err(EngineError::EngineStopped)));
        other.shutdown().expect("second shutdown is a no-op");
    }

    #[test]
    fn invalid_config_is_rejected_before_spawning() {
        let config = BufferConfig {
            max_buffer_size: 0,
            composition_spacing: 10,
        };

        assert!(matches!(
            ReplayBuffer::in_memory(config),
            Err(EngineError::InvalidConfig { .. })
        ));
    }
}
