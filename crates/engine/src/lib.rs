//! Live-replay buffer engine: a circular segment store with staggered
//! anchor compositions that keep a sliding window of recent video seekable.

pub mod api;
pub mod bank;
pub mod buffer;
pub mod clock;
pub mod composition;
pub mod config;
pub mod error;
pub mod lookup;
pub mod segment;
pub mod source;
pub mod store;
pub mod time;

pub use api::{
    BufferCore, Command, EngineErrorEvent, EngineErrorKind, Event, NoopPlaybackConsumer,
    PlaybackConsumer,
};
pub use bank::{AnchorStatus, BankOutcome, CompositionBank};
pub use buffer::{EventReceiver, ReplayBuffer};
pub use clock::TimelineClock;
pub use composition::{
    Composition, CompositionBackend, CompositionEntry, CompositionSnapshot, InMemoryBackend,
    SnapshotHandle,
};
pub use config::BufferConfig;
pub use error::{EngineError, InvalidSegmentReason, Result};
pub use lookup::{BufferState, BufferStatus, BufferView, SeekTarget};
pub use segment::{Segment, SegmentMedia, VideoTrack};
pub use source::{
    DeviceClock, DirectorySource, FfmpegSegmentProbe, ManualClock, MonotonicClock, SegmentProbe,
};
pub use store::{SegmentStore, SlotRecord};
pub use time::{CONTENT_TIME_BASE, MediaTime, Rational, rescale};
