//! `ffprobe`-backed inspection of finished capture segments.

mod error;
mod probe;
mod time;

pub use error::{MediaFfmpegError, Result};
pub use probe::{SegmentInfo, VideoStreamInfo, parse_probe_output, probe_segment};
pub use time::{Rational, decimal_seconds_to_ticks, rescale};
