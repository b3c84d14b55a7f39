//! Queue configuration, loaded once at startup.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::item::UploadMode;

/// Transfer ring capacity preset, trading memory for pipelining depth.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityPreset {
    /// One slot. Recommended for memory-constrained embedders.
    Minimal,
    /// Six slots. Keeps the producer busy across consumer stalls.
    #[default]
    Efficient,
}

impl CapacityPreset {
    /// Number of transfer slots this preset allocates.
    #[must_use]
    pub const fn slots(self) -> usize {
        match self {
            Self::Minimal => 1,
            Self::Efficient => 6,
        }
    }
}

/// Startup configuration for a [`crate::queue::TransferQueue`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Ring capacity preset.
    pub capacity: CapacityPreset,
    /// Initial upload mode for all enqueued content.
    pub upload_mode: UploadMode,
}

impl TransferConfig {
    /// Parses a configuration from TOML text.
    ///
    /// Missing keys fall back to their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}
