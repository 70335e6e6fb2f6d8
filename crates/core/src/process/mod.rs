//! Launching and supervising encoder processes.
//!
//! The runner owns the child process for its whole life: it streams the
//! child's output, reports how it ended and, on request, stops it with a
//! graceful signal followed by a forced kill.

mod config;
mod error;
mod runner;

pub use config::ProcessConfig;
pub use error::ProcessError;
pub use runner::{ExitKind, ProcessEvent, ProcessExit, ProcessHandle, ProcessRunner};
