//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

use crate::encoder::AudioFormat;

/// Configuration for the conversion orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Format suggested to callers that do not name one.
    /// Falls back to the first available format when its tool is missing.
    #[serde(default = "default_format")]
    pub default_format: AudioFormat,
}

fn default_format() -> AudioFormat {
    AudioFormat::Flac
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_format: default_format(),
        }
    }
}
