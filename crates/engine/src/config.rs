use std::iter::StepBy;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

pub const DEFAULT_MAX_BUFFER_SIZE: usize = 45;
pub const DEFAULT_COMPOSITION_SPACING: usize = 10;

/// Geometry of the circular buffer and its anchors.
///
/// Anchors sit at every multiple of `composition_spacing` below
/// `max_buffer_size`; the defaults give anchors at 0, 10, 20, 30 and 40.
///
/// # Example
/// ```
/// use replay_engine::BufferConfig;
///
/// let config: BufferConfig = serde_json::from_str(r#"{ "max_buffer_size": 30 }"#)
///     .expect("valid json");
/// assert_eq!(config.composition_spacing, 10);
/// assert_eq!(config.anchor_offsets().collect::<Vec<_>>(), vec![0, 10, 20]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub max_buffer_size: usize,
    pub composition_spacing: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            composition_spacing: DEFAULT_COMPOSITION_SPACING,
        }
    }
}

impl BufferConfig {
    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|source| EngineError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_buffer_size == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "max_buffer_size must be positive".to_string(),
            });
        }
        if self.composition_spacing == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "composition_spacing must be positive".to_string(),
            });
        }
        if self.composition_spacing > self.max_buffer_size {
            return Err(EngineError::InvalidConfig {
                reason: format!(
                    "composition_spacing {} exceeds max_buffer_size {}",
                    self.composition_spacing, self.max_buffer_size
                ),
            });
        }
        Ok(())
    }

    pub fn anchor_count(&self) -> usize {
        self.max_buffer_size.div_ceil(self.composition_spacing)
    }

    pub fn anchor_offsets(&self) -> StepBy<Range<usize>> {
        (0..self.max_buffer_size).step_by(self.composition_spacing)
    }

    pub fn is_anchor(&self, slot: usize) -> bool {
        slot < self.max_buffer_size && slot % self.composition_spacing == 0
    }

    pub fn slot_for_sequence(&self, sequence: u64) -> usize {
        (sequence % self.max_buffer_size as u64) as usize
    }
}
