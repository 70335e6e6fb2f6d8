//! Configuration for the process runner.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timings and buffer sizes used when supervising an encoder process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// How long a process may take to exit after a graceful stop request (milliseconds).
    #[serde(default = "default_terminate_grace")]
    pub terminate_grace_ms: u64,

    /// How long to wait for a force-killed process to be reaped (milliseconds).
    #[serde(default = "default_kill_wait")]
    pub kill_wait_ms: u64,

    /// Size of each read from stdout/stderr.
    #[serde(default = "default_read_buffer")]
    pub read_buffer_bytes: usize,

    /// How much of the end of stderr is kept for failure messages.
    #[serde(default = "default_diagnostic_tail")]
    pub diagnostic_tail_bytes: usize,
}

fn default_terminate_grace() -> u64 {
    1000
}

fn default_kill_wait() -> u64 {
    100
}

fn default_read_buffer() -> usize {
    4096
}

fn default_diagnostic_tail() -> usize {
    16 * 1024
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            terminate_grace_ms: default_terminate_grace(),
            kill_wait_ms: default_kill_wait(),
            read_buffer_bytes: default_read_buffer(),
            diagnostic_tail_bytes: default_diagnostic_tail(),
        }
    }
}

impl ProcessConfig {
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    pub fn kill_wait(&self) -> Duration {
        Duration::from_millis(self.kill_wait_ms)
    }

    /// Sets the graceful termination window.
    pub fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace_ms = grace.as_millis() as u64;
        self
    }
}
