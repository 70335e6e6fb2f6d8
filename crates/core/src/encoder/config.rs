//! Configuration for the encoder adapters.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration shared by every encoder adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Extra directories searched before the system `PATH`.
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Timeout for the `--version` probe of each tool, in seconds.
    #[serde(default = "default_version_timeout")]
    pub version_timeout_secs: u64,
}

fn default_version_timeout() -> u64 {
    5
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            version_timeout_secs: default_version_timeout(),
        }
    }
}

impl EncoderConfig {
    /// Adds a directory to search before `PATH`.
    pub fn with_search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Sets the version probe timeout.
    pub fn with_version_timeout(mut self, secs: u64) -> Self {
        self.version_timeout_secs = secs;
        self
    }
}
