use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use replay_engine::{
    BufferConfig, DeviceClock, DirectorySource, EngineErrorEvent, Event, EventReceiver,
    FfmpegSegmentProbe, InMemoryBackend, ManualClock, MediaTime, NoopPlaybackConsumer,
    ReplayBuffer, SeekTarget,
};
use serde_json::{Value, json};
use tracing::{info, warn};

/// Feeds a directory of finished segments through the replay buffer and
/// prints the resulting buffer status as JSON.
#[derive(Parser, Debug)]
#[command(name = "replay", version)]
struct Cli {
    /// Directory holding segment files (.mp4, .mov, .m4v, .ts).
    #[arg(long)]
    segments: PathBuf,

    /// Buffer config JSON. Flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of slots in the circular buffer.
    #[arg(long)]
    max_buffer_size: Option<usize>,

    /// Slots between consecutive anchors.
    #[arg(long)]
    spacing: Option<usize>,

    /// Wall-clock pause between submissions.
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    /// Content time to resolve to a seek target; repeatable.
    #[arg(long = "seek-seconds")]
    seek_seconds: Vec<f64>,
}

fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .try_init();
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let clock = ManualClock::new();
    let (buffer, events) = ReplayBuffer::spawn(
        config,
        InMemoryBackend,
        clock.clone(),
        NoopPlaybackConsumer,
    )
    .context("start replay buffer")?;
    let errors = collect_errors(events);

    let source = DirectorySource::open(&cli.segments, FfmpegSegmentProbe)
        .with_context(|| format!("open segment directory '{}'", cli.segments.display()))?;
    info!(segments = source.remaining(), "feeding segments");

    for (path, probed) in source {
        let segment = match probed {
            Ok(segment) => segment,
            Err(error) => {
                warn!(path = %path.display(), %error, "segment skipped");
                continue;
            }
        };
        clock.advance(segment.duration);
        buffer
            .ingest_at(segment, clock.now())
            .context("submit segment")?;
        if cli.interval_ms > 0 {
            thread::sleep(Duration::from_millis(cli.interval_ms));
        }
    }
    buffer.flush().context("drain replay buffer")?;
    let view = buffer.view();
    buffer.shutdown().context("stop replay buffer")?;
    let errors = errors
        .join()
        .map_err(|_| anyhow::anyhow!("event collector panicked"))?;

    let seeks: Vec<Value> = cli
        .seek_seconds
        .iter()
        .map(|&seconds| {
            let time = MediaTime::from_millis((seconds * 1000.0).round() as i64);
            seek_json(seconds, view.seek_target(time))
        })
        .collect();

    let errors: Vec<Value> = errors
        .iter()
        .map(|error| json!({ "kind": format!("{:?}", error.kind), "message": error.message }))
        .collect();

    let report = json!({
        "config": buffer.config(),
        "status": view.status(),
        "errors": errors,
        "seeks": seeks,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize status")?
    );
    Ok(())
}

/// Drains `events` until the worker stops, logging and keeping every error.
fn collect_errors(events: EventReceiver) -> JoinHandle<Vec<EngineErrorEvent>> {
    thread::spawn(move || {
        let mut errors = Vec::new();
        for event in events {
            if let Event::Error(error) = event {
                warn!(kind = ?error.kind, message = %error.message, "buffer reported an error");
                errors.push(error);
            }
        }
        errors
    })
}

fn load_config(cli: &Cli) -> anyhow::Result<BufferConfig> {
    let mut config = match &cli.config {
        Some(path) => BufferConfig::from_json_file(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => BufferConfig::default(),
    };
    if let Some(size) = cli.max_buffer_size {
        config.max_buffer_size = size;
    }
    if let Some(spacing) = cli.spacing {
        config.composition_spacing = spacing;
    }
    config.validate().context("validate buffer config")?;
    Ok(config)
}

fn seek_json(seconds: f64, target: Option<SeekTarget>) -> Value {
    match target {
        Some(target) => json!({
            "seconds": seconds,
            "slot": target.slot,
            "sequence": target.sequence,
            "anchor_offset": target.anchor_offset,
            "snapshot_start": target.snapshot.start_time,
            "local_offset_seconds": target.local_offset.as_seconds_f64(),
        }),
        None => json!({ "seconds": seconds, "available": false }),
    }
}
