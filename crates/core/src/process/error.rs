//! Error types for the process runner.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while starting or supervising a process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The runner already supervises a live process.
    #[error("a process is already running on this runner")]
    AlreadyRunning,

    /// The OS refused to start the process.
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the process failed.
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),
}

impl ProcessError {
    pub fn spawn(program: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Whether the program itself could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProcessError::spawn(
            "/usr/bin/flac",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "failed to start /usr/bin/flac: denied");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found() {
        let err = ProcessError::spawn(
            "lame",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.is_not_found());
    }
}
