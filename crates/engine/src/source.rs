use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{EngineError, InvalidSegmentReason, Result};
use crate::segment::{Segment, SegmentMedia, VideoTrack};
use crate::time::{MediaTime, Rational};

const SEGMENT_EXTENSIONS: [&str; 4] = ["mp4", "mov", "m4v", "ts"];

/// Monotonic device clock used to place the live edge.
pub trait DeviceClock: Send + Sync {
    fn now(&self) -> MediaTime;
}

/// Production clock measuring time since its construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceClock for MonotonicClock {
    fn now(&self) -> MediaTime {
        MediaTime::from_duration(self.origin.elapsed())
    }
}

/// Hand-driven clock. Clones share the same reading.
///
/// # Example
/// ```
/// use replay_engine::{DeviceClock, ManualClock, MediaTime};
///
/// let clock = ManualClock::new();
/// let shared = clock.clone();
/// clock.advance(MediaTime::from_seconds(2));
/// assert_eq!(shared.now(), MediaTime::from_seconds(2));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    ticks: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: MediaTime) {
        self.ticks.store(now.ticks(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: MediaTime) {
        self.ticks.fetch_add(by.ticks(), Ordering::SeqCst);
    }
}

impl DeviceClock for ManualClock {
    fn now(&self) -> MediaTime {
        MediaTime::from_ticks(self.ticks.load(Ordering::SeqCst))
    }
}

/// Turns a finished segment file into an ingestible [`Segment`].
pub trait SegmentProbe {
    fn probe_segment(&self, path: &Path) -> Result<Segment>;
}

/// `ffprobe`-backed probe used by production wiring.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegSegmentProbe;

impl SegmentProbe for FfmpegSegmentProbe {
    fn probe_segment(&self, path: &Path) -> Result<Segment> {
        let info = media_ffmpeg::probe_segment(path)?;

        // Stream duration is exact in its own time base; the container value
        // is rounded to microseconds by ffprobe.
        let duration = info
            .video
            .as_ref()
            .and_then(|stream| {
                stream
                    .duration_ts
                    .map(|ts| MediaTime::from_rational(ts, stream.time_base))
            })
            .or_else(|| {
                info.container_duration_us
                    .map(|us| MediaTime::from_rational(us, Rational::MICROS))
            })
            .ok_or_else(|| EngineError::InvalidSegment {
                reason: InvalidSegmentReason::MissingDuration(path.to_path_buf()),
            })?;

        let video = match info.video {
            Some(stream) => match (stream.width, stream.height) {
                (Some(width), Some(height)) => Some(VideoTrack {
                    time_base: stream.time_base,
                    width,
                    height,
                }),
                _ => {
                    warn!(path = %path.display(), "video stream has no dimensions");
                    None
                }
            },
            None => None,
        };

        debug!(path = %path.display(), %duration, has_video = video.is_some(), "segment probed");
        Ok(Segment::new(
            SegmentMedia {
                path: Some(path.to_path_buf()),
                video,
            },
            duration,
        ))
    }
}

/// Yields the segment files of one directory in lexical order.
#[derive(Debug)]
pub struct DirectorySource<P> {
    probe: P,
    pending: std::vec::IntoIter<PathBuf>,
}

impl<P> DirectorySource<P>
where
    P: SegmentProbe,
{
    pub fn open(dir: impl AsRef<Path>, probe: P) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| EngineError::SourceIo {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| EngineError::SourceIo {
                path: dir.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if is_segment_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(Self {
            probe,
            pending: paths.into_iter(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

impl<P> Iterator for DirectorySource<P>
where
    P: SegmentProbe,
{
    type Item = (PathBuf, Result<Segment>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.pending.next()?;
        let segment = self.probe.probe_segment(&path);
        Some((path, segment))
    }
}

fn is_segment_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SEGMENT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
}
