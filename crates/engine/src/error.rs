use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use crate::time::MediaTime;

/// Result type used by the engine crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced while ingesting segments and maintaining anchors.
///
/// Only `InvalidSegment` aborts a whole ingest. The anchor-level variants are
/// recovered inside the composition bank and surface as events.
#[derive(Debug)]
pub enum EngineError {
    InvalidSegment {
        reason: InvalidSegmentReason,
    },
    AnchorNotFound {
        offset: usize,
    },
    AnchorTrackMissing {
        offset: usize,
    },
    AppendFailed {
        offset: usize,
        reason: String,
    },
    SnapshotFailed {
        offset: usize,
        reason: String,
    },
    InvalidConfig {
        reason: String,
    },
    EngineStopped,
    WorkerSpawn {
        source: std::io::Error,
    },
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    SourceIo {
        path: PathBuf,
        source: std::io::Error,
    },
    Media(media_ffmpeg::MediaFfmpegError),
}

/// Why a segment was rejected before any bookkeeping happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidSegmentReason {
    NonPositiveDuration(MediaTime),
    MissingVideoTrack,
    MissingDuration(PathBuf),
}

impl Display for InvalidSegmentReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveDuration(duration) => {
                write!(f, "duration must be positive, got {duration}")
            }
            Self::MissingVideoTrack => write!(f, "no decodable video track"),
            Self::MissingDuration(path) => {
                write!(f, "duration unavailable for {}", path.display())
            }
        }
    }
}

impl Display for EngineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSegment { reason } => write!(f, "invalid segment: {reason}"),
            Self::AnchorNotFound { offset } => write!(f, "no anchor at slot offset {offset}"),
            Self::AnchorTrackMissing { offset } => {
                write!(f, "active anchor {offset} has no composition track")
            }
            Self::AppendFailed { offset, reason } => {
                write!(f, "append to anchor {offset} failed: {reason}")
            }
            Self::SnapshotFailed { offset, reason } => {
                write!(f, "snapshot of anchor {offset} failed: {reason}")
            }
            Self::InvalidConfig { reason } => write!(f, "invalid buffer config: {reason}"),
            Self::EngineStopped => write!(f, "buffer engine worker has stopped"),
            Self::WorkerSpawn { source } => {
                write!(f, "failed to start buffer engine worker ({source})")
            }
            Self::ConfigIo { path, source } => {
                write!(f, "failed to read config {} ({source})", path.display())
            }
            Self::ConfigParse { path, source } => {
                write!(f, "failed to parse config {} ({source})", path.display())
            }
            Self::SourceIo { path, source } => {
                write!(f, "failed to list segments in {} ({source})", path.display())
            }
            Self::Media(err) => write!(f, "media backend error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::WorkerSpawn { source } => Some(source),
            Self::ConfigIo { source, .. } => Some(source),
            Self::ConfigParse { source, .. } => Some(source),
            Self::SourceIo { source, .. } => Some(source),
            Self::Media(err) => Some(err),
            _ => None,
        }
    }
}

impl From<media_ffmpeg::MediaFfmpegError> for EngineError {
    fn from(value: media_ffmpeg::MediaFfmpegError) -> Self {
        Self::Media(value)
    }
}
