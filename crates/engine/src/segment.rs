use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{EngineError, InvalidSegmentReason, Result};
use crate::time::{MediaTime, Rational};

/// Video track description of one captured segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTrack {
    pub time_base: Rational,
    pub width: u32,
    pub height: u32,
}

/// Decodable media behind a segment. Shared by every composition the
/// segment is appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMedia {
    pub path: Option<PathBuf>,
    pub video: Option<VideoTrack>,
}

/// One short clip produced by the capture pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub media: Arc<SegmentMedia>,
    pub duration: MediaTime,
}

impl Segment {
    pub fn new(media: SegmentMedia, duration: MediaTime) -> Self {
        Self {
            media: Arc::new(media),
            duration,
        }
    }

    /// Builds an in-memory segment with a video track and no backing file.
    ///
    /// # Example
    /// ```
    /// use replay_engine::{MediaTime, Segment};
    ///
    /// let segment = Segment::video(MediaTime::from_seconds(1), 1280, 720);
    /// assert!(segment.validate().is_ok());
    /// ```
    pub fn video(duration: MediaTime, width: u32, height: u32) -> Self {
        Self::new(
            SegmentMedia {
                path: None,
                video: Some(VideoTrack {
                    time_base: crate::time::CONTENT_TIME_BASE,
                    width,
                    height,
                }),
            },
            duration,
        )
    }

    /// Rejects segments that must not touch the clock or any slot.
    pub fn validate(&self) -> Result<()> {
        if !self.duration.is_positive() {
            return Err(EngineError::InvalidSegment {
                reason: InvalidSegmentReason::NonPositiveDuration(self.duration),
            });
        }
        if self.media.video.is_none() {
            return Err(EngineError::InvalidSegment {
                reason: InvalidSegmentReason::MissingVideoTrack,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Segment, SegmentMedia};
    use crate::error::{EngineError, InvalidSegmentReason};
    use crate::time::MediaTime;

    #[test]
    fn validate_rejects_zero_and_negative_durations() {
        for duration in [MediaTime::ZERO, MediaTime::from_millis(-40)] {
            let error = Segment::video(duration, 16, 9)
                .validate()
                .expect_err("non-positive duration must be rejected");
            assert!(matches!(
                error,
                EngineError::InvalidSegment {
                    reason: InvalidSegmentReason::NonPositiveDuration(_)
                }
            ));
        }
    }

    #[test]
    fn validate_rejects_segments_without_video() {
        let segment = Segment::new(
            SegmentMedia {
                path: None,
                video: None,
            },
            MediaTime::from_seconds(1),
        );

        assert!(matches!(
            segment.validate(),
            Err(EngineError::InvalidSegment {
                reason: InvalidSegmentReason::MissingVideoTrack
            })
        ));
    }
}
