//! Types for the conversion orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::encoder::{output_path_in, AudioFormat, ConversionOptions, ConversionRequest};
use crate::process::ProcessError;

/// Identifier of one conversion job, unique per orchestrator.
pub type JobId = u64;

/// Errors reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrchestratorError {
    /// No adapter is registered for the format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The adapter's tool was not found on this host.
    #[error("{tool} is not available, cannot encode {format}")]
    ToolUnavailable { format: AudioFormat, tool: String },

    /// The encoder process could not be started.
    #[error("failed to start {program}: {message}")]
    SpawnFailure { program: String, message: String },

    /// The encoder ran and failed.
    #[error("encoding failed: {message}")]
    EncodeFailure { message: String },

    /// Another conversion holds the single conversion slot.
    #[error("a conversion is already in progress")]
    AlreadyInProgress,

    /// The conversion was canceled before it finished.
    #[error("conversion canceled")]
    Canceled,

    /// The request itself is unusable.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl OrchestratorError {
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::EncodeFailure {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub(crate) fn spawn_failed(program: &str, error: &ProcessError) -> Self {
        let message = match error {
            ProcessError::Spawn { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        Self::SpawnFailure {
            program: program.to_string(),
            message,
        }
    }

    pub fn is_already_in_progress(&self) -> bool {
        matches!(self, Self::AlreadyInProgress)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Coarse state of the single conversion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionState {
    /// No conversion is active.
    Idle,
    /// The slot is taken and the encoder is being launched.
    Starting,
    /// The encoder is running.
    Running,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(OrchestratorError),
    Canceled,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// A successfully finished conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionResult {
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub format: AudioFormat,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

/// Snapshot of the active job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: ConversionState,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub format: AudioFormat,
    pub percent: Option<u8>,
    pub batch_index: Option<usize>,
    pub started_at: DateTime<Utc>,
}

/// Notifications delivered to subscribers, in order.
///
/// Every job produces exactly one `Finished`. A job whose request is
/// rejected before launch (possible only inside a batch) produces a
/// `Finished` without a preceding `Started`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionEvent {
    Started {
        job_id: JobId,
        input_path: PathBuf,
        output_path: PathBuf,
        format: AudioFormat,
        batch_index: Option<usize>,
    },
    Progress {
        job_id: JobId,
        percent: u8,
    },
    Finished {
        job_id: JobId,
        input_path: PathBuf,
        output_path: PathBuf,
        outcome: JobOutcome,
    },
    BatchFinished(BatchSummary),
}

impl ConversionEvent {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::Started { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Finished { job_id, .. } => Some(*job_id),
            Self::BatchFinished(_) => None,
        }
    }
}

/// Where batch outputs are written.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputLocation {
    /// Next to each source file.
    #[default]
    AlongsideSource,
    /// All outputs in one directory.
    Directory(PathBuf),
}

impl OutputLocation {
    /// Output path for `input` in `format`.
    pub fn output_for(&self, input: &Path, format: AudioFormat) -> PathBuf {
        match self {
            Self::AlongsideSource => output_path_in(
                input.parent().unwrap_or_else(|| Path::new("")),
                input,
                format,
            ),
            Self::Directory(dir) => output_path_in(dir, input, format),
        }
    }
}

/// A list of inputs converted one after another with shared options.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub inputs: Vec<PathBuf>,
    pub options: ConversionOptions,
    pub location: OutputLocation,
}

impl BatchRequest {
    pub fn new(inputs: Vec<PathBuf>, options: ConversionOptions) -> Self {
        Self {
            inputs,
            options,
            location: OutputLocation::AlongsideSource,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.location = OutputLocation::Directory(dir.into());
        self
    }

    pub(crate) fn request_for(&self, index: usize) -> Option<ConversionRequest> {
        let input = self.inputs.get(index)?;
        let output = self.location.output_for(input, self.options.format);
        Some(ConversionRequest::new(
            input.clone(),
            output,
            self.options.clone(),
        ))
    }
}

/// A batch item that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub input_path: PathBuf,
    pub message: String,
}

/// Totals reported when a batch ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub canceled: usize,
    pub failures: Vec<BatchFailure>,
    /// The batch was canceled before its last item.
    pub aborted: bool,
}

impl BatchSummary {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub fn record(&mut self, input: &Path, outcome: &JobOutcome) {
        match outcome {
            JobOutcome::Succeeded => self.succeeded += 1,
            JobOutcome::Failed(err) => {
                self.failed += 1;
                self.failures.push(BatchFailure {
                    input_path: input.to_path_buf(),
                    message: err.to_string(),
                });
            }
            JobOutcome::Canceled => self.canceled += 1,
        }
    }

    /// Items that reached a terminal state.
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.canceled
    }

    pub fn all_succeeded(&self) -> bool {
        !self.aborted && self.succeeded == self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::ToolUnavailable {
            format: AudioFormat::Mp3,
            tool: "lame".to_string(),
        };
        assert_eq!(err.to_string(), "lame is not available, cannot encode mp3");

        let err = OrchestratorError::encode_failed("exited with code 1");
        assert_eq!(err.to_string(), "encoding failed: exited with code 1");

        assert!(OrchestratorError::AlreadyInProgress.is_already_in_progress());
        assert!(OrchestratorError::Canceled.is_canceled());
    }

    #[test]
    fn test_spawn_failed_message() {
        let source = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = ProcessError::spawn("/bin/flac", source);
        let err = OrchestratorError::spawn_failed("flac", &error);
        assert_eq!(err.to_string(), "failed to start flac: denied");
    }

    #[test]
    fn test_output_location_alongside() {
        let location = OutputLocation::AlongsideSource;
        assert_eq!(
            location.output_for(Path::new("/music/a/song.wav"), AudioFormat::Ogg),
            PathBuf::from("/music/a/song.ogg")
        );
    }

    #[test]
    fn test_output_location_directory() {
        let location = OutputLocation::Directory(PathBuf::from("/out"));
        assert_eq!(
            location.output_for(Path::new("/music/a/song.wav"), AudioFormat::Mp3),
            PathBuf::from("/out/song.mp3")
        );
    }

    #[test]
    fn test_batch_request_items() {
        let batch = BatchRequest::new(
            vec![PathBuf::from("/in/one.wav"), PathBuf::from("/in/two.wav")],
            ConversionOptions::new(AudioFormat::Flac),
        )
        .with_output_dir("/out");

        let second = batch.request_for(1).unwrap();
        assert_eq!(second.input_path, PathBuf::from("/in/two.wav"));
        assert_eq!(second.output_path, PathBuf::from("/out/two.flac"));
        assert!(batch.request_for(2).is_none());
    }

    #[test]
    fn test_batch_summary_record() {
        let mut summary = BatchSummary::new(3);
        summary.record(Path::new("a.wav"), &JobOutcome::Succeeded);
        summary.record(
            Path::new("b.wav"),
            &JobOutcome::Failed(OrchestratorError::encode_failed("bad header")),
        );
        summary.record(Path::new("c.wav"), &JobOutcome::Canceled);

        assert_eq!(summary.processed(), 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].input_path, PathBuf::from("b.wav"));
        assert_eq!(summary.failures[0].message, "encoding failed: bad header");
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_event_job_id() {
        let event = ConversionEvent::Progress {
            job_id: 7,
            percent: 10,
        };
        assert_eq!(event.job_id(), Some(7));
        assert_eq!(
            ConversionEvent::BatchFinished(BatchSummary::new(0)).job_id(),
            None
        );
    }
}
