use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::composition::{Composition, CompositionBackend, SnapshotHandle};
use crate::config::BufferConfig;
use crate::error::{EngineError, Result};
use crate::segment::Segment;
use crate::time::MediaTime;

#[derive(Debug)]
struct Anchor {
    offset: usize,
    composition: Option<Composition>,
    published: Option<SnapshotHandle>,
    /// Set when an append failed; cleared by the next reset.
    degraded: bool,
    reset_count: u64,
}

impl Anchor {
    fn new(offset: usize) -> Self {
        Self {
            offset,
            composition: None,
            published: None,
            degraded: false,
            reset_count: 0,
        }
    }
}

/// Diagnostic view of one anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnchorStatus {
    pub offset: usize,
    pub active: bool,
    pub degraded: bool,
    /// Recycles after the first activation.
    pub reset_count: u64,
    pub segment_count: usize,
    pub duration: MediaTime,
}

/// What one ingest did to the anchors.
#[derive(Debug, Default)]
pub struct BankOutcome {
    /// Offset of the anchor started on this slot, if any.
    pub reset: Option<usize>,
    pub published: Vec<SnapshotHandle>,
    pub failures: Vec<EngineError>,
}

impl BankOutcome {
    pub fn published_for(&self, offset: usize) -> Option<&SnapshotHandle> {
        self.published
            .iter()
            .find(|snapshot| snapshot.anchor_offset == offset)
    }
}

/// The staggered set of growing anchor compositions.
///
/// Exactly one anchor restarts whenever the write cursor lands on its
/// offset; all other active anchors keep growing, so no composition is
/// ever truncated at its front and none outgrows `max_buffer_size`
/// segments.
#[derive(Debug)]
pub struct CompositionBank<B> {
    spacing: usize,
    anchors: Vec<Anchor>,
    backend: B,
}

impl<B> CompositionBank<B>
where
    B: CompositionBackend,
{
    pub fn new(config: &BufferConfig, backend: B) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            spacing: config.composition_spacing,
            anchors: config.anchor_offsets().map(Anchor::new).collect(),
            backend,
        })
    }

    /// Applies one segment to every active anchor.
    ///
    /// `sequence` is the global index of the segment and `slot` its buffer
    /// position. Anchor failures are logged and collected; the remaining
    /// anchors are still processed.
    pub fn ingest(
        &mut self,
        segment: &Segment,
        slot: usize,
        sequence: u64,
        start_time: MediaTime,
    ) -> BankOutcome {
        let mut outcome = BankOutcome::default();

        for anchor in &mut self.anchors {
            let offset = anchor.offset;
            if sequence < offset as u64 {
                continue;
            }

            if slot == offset {
                if anchor.composition.is_some() {
                    anchor.reset_count += 1;
                    info!(offset, sequence, reset_count = anchor.reset_count, "anchor recycled");
                } else {
                    info!(offset, sequence, "anchor activated");
                }
                anchor.composition = Some(Composition::new(offset, start_time, sequence));
                anchor.published = None;
                anchor.degraded = false;
                outcome.reset = Some(offset);
            } else if anchor.degraded {
                debug!(offset, sequence, "degraded anchor skipped until its next reset");
                continue;
            }

            let Some(composition) = anchor.composition.as_mut() else {
                let error = EngineError::AnchorTrackMissing { offset };
                warn!(offset, sequence, %error, "anchor skipped");
                outcome.failures.push(error);
                continue;
            };

            if let Err(error) = self.backend.append(composition, segment, sequence) {
                warn!(offset, sequence, %error, "append failed; anchor degraded");
                anchor.degraded = true;
                outcome.failures.push(error);
                continue;
            }

            match self.backend.snapshot(composition) {
                Ok(snapshot) => {
                    let handle = Arc::new(snapshot);
                    anchor.published = Some(Arc::clone(&handle));
                    outcome.published.push(handle);
                }
                Err(error) => {
                    warn!(offset, sequence, %error, "snapshot failed; keeping previous snapshot");
                    outcome.failures.push(error);
                }
            }
        }

        outcome
    }

    /// Drops every composition and published snapshot.
    pub fn reset_all(&mut self) {
        for anchor in &mut self.anchors {
            *anchor = Anchor::new(anchor.offset);
        }
    }

    /// Latest snapshot published by the anchor at `offset`.
    pub fn published(&self, offset: usize) -> Result<Option<SnapshotHandle>> {
        Ok(self.anchor(offset)?.published.clone())
    }

    pub fn status(&self, offset: usize) -> Result<AnchorStatus> {
        Ok(status_of(self.anchor(offset)?))
    }

    pub fn statuses(&self) -> Vec<AnchorStatus> {
        self.anchors.iter().map(status_of).collect()
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn anchor(&self, offset: usize) -> Result<&Anchor> {
        if offset % self.spacing != 0 {
            return Err(EngineError::AnchorNotFound { offset });
        }
        self.anchors
            .get(offset / self.spacing)
            .ok_or(EngineError::AnchorNotFound { offset })
    }
}

fn status_of(anchor: &Anchor) -> AnchorStatus {
    AnchorStatus {
        offset: anchor.offset,
        active: anchor.composition.is_some(),
        degraded: anchor.degraded,
        reset_count: anchor.reset_count,
        segment_count: anchor
            .composition
            .as_ref()
            .map_or(0, |composition| composition.entries().len()),
        duration: anchor
            .composition
            .as_ref()
            .map_or(MediaTime::ZERO, Composition::duration),
    }
}
