use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{MediaFfmpegError, Result};
use crate::time::{Rational, decimal_seconds_to_ticks};

/// Video stream metadata of one segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoStreamInfo {
    pub index: u32,
    pub time_base: Rational,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_ts: Option<i64>,
}

/// Probe result for one finished capture segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub path: PathBuf,
    pub video: Option<VideoStreamInfo>,
    /// Container duration in microseconds, as precise as `ffprobe` prints it.
    pub container_duration_us: Option<i64>,
}

impl SegmentInfo {
    /// Returns the video stream or `MissingVideoStream`.
    pub fn require_video(&self) -> Result<&VideoStreamInfo> {
        self.video
            .as_ref()
            .ok_or_else(|| MediaFfmpegError::MissingVideoStream(self.path.clone()))
    }
}

/// Probes a segment file via a single `ffprobe` invocation.
///
/// # Example
/// ```no_run
/// use media_ffmpeg::probe_segment;
///
/// let info = probe_segment("segment-0001.mp4").expect("probe should succeed");
/// assert!(info.video.is_some());
/// ```
pub fn probe_segment(path: impl AsRef<Path>) -> Result<SegmentInfo> {
    let path = path.as_ref();

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-select_streams",
            "v",
            "-show_entries",
            "stream=index,codec_type,time_base,width,height,duration_ts:format=duration",
            "-of",
            "compact=nk=0",
        ])
        .arg(path)
        .output()
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffprobe segment probe",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: format!("ffprobe segment probe: ffprobe {}", path.display()),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let stdout = String::from_utf8(output.stdout)?;
    parse_probe_output(path, &stdout)
}

/// Parses the compact `ffprobe` output produced by [`probe_segment`].
///
/// Lines are `stream|key=value|...` and `format|duration=...`. The first
/// video stream wins; other sections are ignored.
pub fn parse_probe_output(path: &Path, stdout: &str) -> Result<SegmentInfo> {
    let mut video = None;
    let mut container_duration_us = None;

    for line in stdout.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let (section, fields) = line.split_once('|').unwrap_or((line, ""));
        let map = parse_fields(fields)?;
        match section {
            "stream" if video.is_none() => {
                if map.get("codec_type").copied() == Some("video") {
                    video = Some(parse_video_stream(&map, line)?);
                }
            }
            "format" => {
                container_duration_us = match map.get("duration").copied() {
                    Some(raw) if !raw.is_empty() && raw != "N/A" => {
                        Some(decimal_seconds_to_ticks(raw, Rational::MICROS)?)
                    }
                    _ => None,
                };
            }
            _ => {}
        }
    }

    Ok(SegmentInfo {
        path: path.to_path_buf(),
        video,
        container_duration_us,
    })
}

fn parse_fields(fields: &str) -> Result<HashMap<&str, &str>> {
    let mut map = HashMap::new();
    for field in fields.split('|').filter(|field| !field.is_empty()) {
        let (key, value) = field
            .split_once('=')
            .ok_or_else(|| MediaFfmpegError::Parse {
                context: "probe field",
                value: field.to_string(),
            })?;
        map.insert(key.trim(), value.trim().trim_matches('"'));
    }
    Ok(map)
}

fn parse_video_stream(map: &HashMap<&str, &str>, line: &str) -> Result<VideoStreamInfo> {
    let index = parse_optional(map.get("index").copied(), "stream index", str::parse::<u32>)?
        .ok_or_else(|| MediaFfmpegError::Parse {
            context: "stream index",
            value: line.to_string(),
        })?;
    let time_base = match map.get("time_base").copied() {
        Some(raw) if !raw.is_empty() && raw != "N/A" && raw != "0/0" => Rational::parse(raw)?,
        _ => {
            return Err(MediaFfmpegError::Parse {
                context: "time_base",
                value: line.to_string(),
            });
        }
    };

    Ok(VideoStreamInfo {
        index,
        time_base,
        width: parse_optional(map.get("width").copied(), "width", str::parse::<u32>)?,
        height: parse_optional(map.get("height").copied(), "height", str::parse::<u32>)?,
        duration_ts: parse_optional(
            map.get("duration_ts").copied(),
            "duration_ts",
            str::parse::<i64>,
        )?,
    })
}

fn parse_optional<T, F>(value: Option<&str>, context: &'static str, parse: F) -> Result<Option<T>>
where
    F: Fn(&str) -> std::result::Result<T, std::num::ParseIntError>,
{
    let Some(raw) = value else {
        return Ok(None);
    };
    if raw.is_empty() || raw == "N/A" {
        return Ok(None);
    }

    parse(raw).map(Some).map_err(|_| MediaFfmpegError::Parse {
        context,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::parse_probe_output;
    use crate::time::Rational;

    #[test]
    fn parse_reads_video_stream_and_container_duration() {
        let stdout = "stream|index=0|codec_type=video|time_base=1/15360|width=1280|height=720|duration_ts=15360\n\
                      format|duration=1.000000\n";

        let info = parse_probe_output(Path::new("seg.mp4"), stdout).expect("parse should succeed");

        let video = info.video.expect("video stream should be parsed");
        assert_eq!(video.index, 0);
        assert_eq!(video.time_base, Rational::new(1, 15_360).expect("valid"));
        assert_eq!(video.width, Some(1280));
        assert_eq!(video.duration_ts, Some(15_360));
        assert_eq!(info.container_duration_us, Some(1_000_000));
    }

    #[test]
    fn parse_treats_not_available_fields_as_missing() {
        let stdout = "stream|index=0|codec_type=video|time_base=1/90000|width=N/A|height=N/A|duration_ts=N/A\n\
                      format|duration=N/A\n";

        let info = parse_probe_output(Path::new("seg.ts"), stdout).expect("parse should succeed");

        let video = info.video.expect("video stream should be parsed");
        assert_eq!(video.width, None);
        assert_eq!(video.duration_ts, None);
        assert_eq!(info.container_duration_us, None);
    }

    #[test]
    fn parse_without_video_stream_reports_missing_video() {
        let stdout = "format|duration=0.960000\n";

        let info = parse_probe_output(Path::new("audio.m4a"), stdout).expect("parse should succeed");

        assert!(info.video.is_none());
        assert!(info.require_video().is_err());
    }

    #[test]
    fn parse_rejects_stream_without_time_base() {
        let stdout = "stream|index=0|codec_type=video|time_base=0/0\n";

        assert!(parse_probe_output(Path::new("broken.mp4"), stdout).is_err());
    }
}
