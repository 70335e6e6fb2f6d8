//! The conversion orchestrator.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use super::config::OrchestratorConfig;
use super::registry::AdapterRegistry;
use super::types::{
    BatchRequest, BatchSummary, ConversionEvent, ConversionResult, ConversionState, JobId,
    JobOutcome, JobStatus, OrchestratorError, OutputLocation,
};
use crate::encoder::{AudioFormat, ConversionRequest, EncoderAdapter};
use crate::metrics;
use crate::process::{ProcessConfig, ProcessEvent, ProcessExit, ProcessHandle, ProcessRunner};

type Completion = oneshot::Sender<Result<ConversionResult, OrchestratorError>>;

/// Lines of encoder diagnostics kept in a failure message.
const FAILURE_MESSAGE_LINES: usize = 5;

struct ActiveJob {
    id: JobId,
    request: ConversionRequest,
    handle: Arc<ProcessHandle>,
    batch_index: Option<usize>,
    /// Set once a cancel has started; process events for the job are ignored from then on.
    stopping: bool,
    last_percent: Option<u8>,
    started_at: Instant,
    started_wall: DateTime<Utc>,
    completion: Option<Completion>,
}

struct BatchQueue {
    request: BatchRequest,
    cursor: usize,
    summary: BatchSummary,
    abort_requested: bool,
    completion: Option<oneshot::Sender<BatchSummary>>,
}

struct Inner {
    state: ConversionState,
    job: Option<ActiveJob>,
    batch: Option<BatchQueue>,
    next_job_id: JobId,
    subscribers: Vec<mpsc::UnboundedSender<ConversionEvent>>,
}

impl Inner {
    fn allocate_job_id(&mut self) -> JobId {
        self.next_job_id += 1;
        self.next_job_id
    }

    fn emit(&mut self, event: ConversionEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn ensure_idle(&self) -> Result<(), OrchestratorError> {
        if self.job.is_some() || self.batch.is_some() {
            return Err(OrchestratorError::AlreadyInProgress);
        }
        Ok(())
    }
}

struct Shared {
    registry: AdapterRegistry,
    config: OrchestratorConfig,
    process_config: ProcessConfig,
    inner: Mutex<Inner>,
}

/// Runs one conversion at a time and sequences batches.
///
/// Cloning is cheap; clones share the same conversion slot.
///
/// State moves `Idle -> Starting -> Running -> Idle`. Every job ends with
/// exactly one [`ConversionEvent::Finished`] whose outcome is success,
/// failure or cancellation. Events are emitted while the state lock is
/// held, so a job's events reach each subscriber in order and nothing is
/// emitted for a job after its terminal event.
#[derive(Clone)]
pub struct ConversionOrchestrator {
    shared: Arc<Shared>,
}

impl ConversionOrchestrator {
    pub fn new(
        registry: AdapterRegistry,
        config: OrchestratorConfig,
        process_config: ProcessConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                config,
                process_config,
                inner: Mutex::new(Inner {
                    state: ConversionState::Idle,
                    job: None,
                    batch: None,
                    next_job_id: 0,
                    subscribers: Vec::new(),
                }),
            }),
        }
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.shared.registry
    }

    /// The configured default format, or the first available one if its tool is missing.
    pub fn default_format(&self) -> Option<AudioFormat> {
        self.shared
            .registry
            .preferred_format(self.shared.config.default_format)
    }

    /// Opens a new event stream. Events emitted before this call are not replayed.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<ConversionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.inner.lock().await.subscribers.push(tx);
        rx
    }

    pub async fn state(&self) -> ConversionState {
        self.shared.inner.lock().await.state
    }

    /// Snapshot of the active job, if any.
    pub async fn status(&self) -> Option<JobStatus> {
        let inner = self.shared.inner.lock().await;
        inner.job.as_ref().map(|job| JobStatus {
            job_id: job.id,
            state: inner.state,
            input_path: job.request.input_path.clone(),
            output_path: job.request.output_path.clone(),
            format: job.request.format(),
            percent: job.last_percent,
            batch_index: job.batch_index,
            started_at: job.started_wall,
        })
    }

    /// Starts a conversion and returns its job id without waiting for it.
    ///
    /// Rejected without any state change when another conversion is active,
    /// the format has no usable tool, or the request is invalid. A failure to
    /// launch the encoder is reported through the job's `Finished` event.
    pub async fn convert_async(
        &self,
        request: ConversionRequest,
    ) -> Result<JobId, OrchestratorError> {
        let mut inner = self.shared.inner.lock().await;
        inner.ensure_idle()?;
        self.start_job(&mut inner, request, None, None).await
    }

    /// Runs a conversion to completion.
    ///
    /// Occupies the same slot and emits the same events as [`convert_async`].
    ///
    /// [`convert_async`]: Self::convert_async
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionResult, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut inner = self.shared.inner.lock().await;
            inner.ensure_idle()?;
            self.start_job(&mut inner, request, None, Some(tx)).await?;
        }
        rx.await.unwrap_or(Err(OrchestratorError::Canceled))
    }

    /// Queues a batch and starts its first item. Returns the number of items.
    ///
    /// Items run strictly one after another. A failing item is recorded and
    /// the batch moves on; a [`ConversionEvent::BatchFinished`] follows the
    /// last item.
    pub async fn convert_batch(&self, request: BatchRequest) -> Result<usize, OrchestratorError> {
        self.submit_batch(request, None).await
    }

    /// Runs a batch to completion and returns its summary.
    pub async fn run_batch(
        &self,
        request: BatchRequest,
    ) -> Result<BatchSummary, OrchestratorError> {
        let (tx, rx) = oneshot::channel();
        let total = request.inputs.len();
        self.submit_batch(request, Some(tx)).await?;
        Ok(rx.await.unwrap_or_else(|_| BatchSummary {
            aborted: true,
            ..BatchSummary::new(total)
        }))
    }

    /// Cancels the active conversion and drops any queued batch items.
    ///
    /// Resolves once the encoder is gone and the partial output file is
    /// removed. Other calls are served meanwhile, and the slot stays taken
    /// until the job has ended. A no-op when idle.
    pub async fn cancel(&self) {
        self.stop_current(true).await;
    }

    /// Cancels only the current batch item; the batch continues with the next.
    ///
    /// Outside a batch this is the same as [`cancel`](Self::cancel).
    pub async fn skip(&self) {
        self.stop_current(false).await;
    }

    async fn submit_batch(
        &self,
        request: BatchRequest,
        completion: Option<oneshot::Sender<BatchSummary>>,
    ) -> Result<usize, OrchestratorError> {
        if request.inputs.is_empty() {
            return Err(OrchestratorError::invalid("batch has no input files"));
        }
        if let OutputLocation::Directory(dir) = &request.location {
            if !tokio::fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
                return Err(OrchestratorError::invalid(format!(
                    "output directory does not exist: {}",
                    dir.display()
                )));
            }
        }
        self.shared.registry.resolve(request.options.format)?;

        let mut inner = self.shared.inner.lock().await;
        inner.ensure_idle()?;

        let total = request.inputs.len();
        info!(
            items = total,
            format = %request.options.format,
            "Starting batch conversion"
        );
        inner.batch = Some(BatchQueue {
            request,
            cursor: 0,
            summary: BatchSummary::new(total),
            abort_requested: false,
            completion,
        });
        self.advance_batch(&mut inner).await;
        Ok(total)
    }

    /// Validates a request, launches its encoder and takes the slot.
    ///
    /// Errors leave the state untouched.
    async fn start_job(
        &self,
        inner: &mut Inner,
        request: ConversionRequest,
        batch_index: Option<usize>,
        completion: Option<Completion>,
    ) -> Result<JobId, OrchestratorError> {
        let (adapter, program) = self.shared.registry.resolve(request.format())?;
        validate_paths(&request).await?;

        inner.state = ConversionState::Starting;
        let plan = adapter.build_plan(&request);
        debug!(command = %plan.display_command(), "Built execution plan");

        let runner = ProcessRunner::new(self.shared.process_config.clone());
        let (handle, events) = match runner.spawn(&program, plan.args()) {
            Ok(spawned) => spawned,
            Err(e) => {
                inner.state = ConversionState::Idle;
                return Err(OrchestratorError::spawn_failed(plan.program(), &e));
            }
        };

        let job_id = inner.allocate_job_id();
        info!(
            job_id,
            input = %request.input_path.display(),
            output = %request.output_path.display(),
            format = %request.format(),
            "Conversion started"
        );

        inner.emit(ConversionEvent::Started {
            job_id,
            input_path: request.input_path.clone(),
            output_path: request.output_path.clone(),
            format: request.format(),
            batch_index,
        });
        inner.job = Some(ActiveJob {
            id: job_id,
            request,
            handle: Arc::new(handle),
            batch_index,
            stopping: false,
            last_percent: None,
            started_at: Instant::now(),
            started_wall: Utc::now(),
            completion,
        });
        inner.state = ConversionState::Running;

        self.spawn_monitor(job_id, adapter, plan.program().to_string(), events);
        Ok(job_id)
    }

    fn spawn_monitor(
        &self,
        job_id: JobId,
        adapter: Arc<dyn EncoderAdapter>,
        program: String,
        events: mpsc::UnboundedReceiver<ProcessEvent>,
    ) {
        let this = self.clone();
        tokio::spawn(async move {
            this.monitor(job_id, adapter, program, events).await;
        });
    }

    /// Turns process events for one job into progress and a terminal outcome.
    async fn monitor(
        self,
        job_id: JobId,
        adapter: Arc<dyn EncoderAdapter>,
        program: String,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    ) {
        let streams = adapter.progress_streams();

        while let Some(event) = events.recv().await {
            match event {
                ProcessEvent::Output { stream, text } => {
                    if !streams.accepts(stream) {
                        continue;
                    }
                    if let Some(percent) = adapter.parse_progress(&text) {
                        self.report_progress(job_id, percent).await;
                    }
                }
                ProcessEvent::Exited(exit) => {
                    let outcome = if exit.success() {
                        JobOutcome::Succeeded
                    } else {
                        JobOutcome::Failed(OrchestratorError::encode_failed(failure_message(
                            &program, &exit,
                        )))
                    };
                    self.finish_job(job_id, outcome).await;
                    return;
                }
                ProcessEvent::SpawnFailed(err) => {
                    metrics::SPAWN_FAILURES_TOTAL.inc();
                    let outcome =
                        JobOutcome::Failed(OrchestratorError::spawn_failed(&program, &err));
                    self.finish_job(job_id, outcome).await;
                    return;
                }
            }
        }

        // The stream closes without a terminal event only after cancellation.
        debug!(job_id, "Process events closed");
    }

    async fn report_progress(&self, job_id: JobId, percent: u8) {
        let mut inner = self.shared.inner.lock().await;
        let Some(job) = inner
            .job
            .as_mut()
            .filter(|job| job.id == job_id && !job.stopping)
        else {
            return;
        };
        if job.last_percent == Some(percent) {
            return;
        }
        job.last_percent = Some(percent);
        inner.emit(ConversionEvent::Progress { job_id, percent });
    }

    async fn finish_job(&self, job_id: JobId, outcome: JobOutcome) {
        let mut inner = self.shared.inner.lock().await;
        let active = inner
            .job
            .as_ref()
            .is_some_and(|job| job.id == job_id && !job.stopping);
        if !active {
            debug!(job_id, "Ignoring completion of a job that is no longer active");
            return;
        }
        if let Some(job) = inner.job.take() {
            self.complete(&mut inner, job, outcome);
        }
        self.advance_batch(&mut inner).await;
    }

    /// Records the terminal outcome of a job and frees the slot.
    fn complete(&self, inner: &mut Inner, mut job: ActiveJob, outcome: JobOutcome) {
        let elapsed = job.started_at.elapsed();
        let format = job.request.format();
        metrics::record_conversion(format, &outcome, elapsed);

        match &outcome {
            JobOutcome::Succeeded => info!(
                job_id = job.id,
                output = %job.request.output_path.display(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Conversion finished"
            ),
            JobOutcome::Failed(err) => warn!(
                job_id = job.id,
                input = %job.request.input_path.display(),
                error = %err,
                "Conversion failed"
            ),
            JobOutcome::Canceled => info!(job_id = job.id, "Conversion canceled"),
        }

        if job.batch_index.is_some() {
            if let Some(batch) = inner.batch.as_mut() {
                batch.summary.record(&job.request.input_path, &outcome);
            }
        }

        inner.emit(ConversionEvent::Finished {
            job_id: job.id,
            input_path: job.request.input_path.clone(),
            output_path: job.request.output_path.clone(),
            outcome: outcome.clone(),
        });
        inner.state = ConversionState::Idle;

        if let Some(tx) = job.completion.take() {
            let result = match outcome {
                JobOutcome::Succeeded => Ok(ConversionResult {
                    job_id: job.id,
                    input_path: job.request.input_path,
                    output_path: job.request.output_path,
                    format,
                    duration: elapsed,
                    finished_at: Utc::now(),
                }),
                JobOutcome::Failed(err) => Err(err),
                JobOutcome::Canceled => Err(OrchestratorError::Canceled),
            };
            let _ = tx.send(result);
        }
    }

    /// Starts the next runnable batch item, or ends the batch.
    ///
    /// Items rejected before launch are recorded as failures and skipped
    /// over in the same pass.
    async fn advance_batch(&self, inner: &mut Inner) {
        loop {
            let Some(batch) = inner.batch.as_mut() else {
                return;
            };
            let index = batch.cursor;
            let Some(request) = batch.request.request_for(index) else {
                self.end_batch(inner, false);
                return;
            };
            batch.cursor += 1;

            let input = request.input_path.clone();
            let output = request.output_path.clone();
            let format = request.format();
            let err = match self.start_job(inner, request, Some(index), None).await {
                Ok(_) => return,
                Err(err) => err,
            };

            let job_id = inner.allocate_job_id();
            warn!(
                job_id,
                index,
                input = %input.display(),
                error = %err,
                "Skipping batch item"
            );
            let outcome = JobOutcome::Failed(err);
            metrics::record_conversion(format, &outcome, Duration::ZERO);
            if let Some(batch) = inner.batch.as_mut() {
                batch.summary.record(&input, &outcome);
            }
            inner.emit(ConversionEvent::Finished {
                job_id,
                input_path: input,
                output_path: output,
                outcome,
            });
        }
    }

    fn end_batch(&self, inner: &mut Inner, aborted: bool) {
        let Some(mut batch) = inner.batch.take() else {
            return;
        };
        batch.summary.aborted = aborted;
        metrics::record_batch(aborted);
        info!(
            total = batch.summary.total,
            succeeded = batch.summary.succeeded,
            failed = batch.summary.failed,
            canceled = batch.summary.canceled,
            aborted,
            "Batch finished"
        );
        inner.emit(ConversionEvent::BatchFinished(batch.summary.clone()));
        if let Some(tx) = batch.completion.take() {
            let _ = tx.send(batch.summary);
        }
    }

    /// Stops the active job, then aborts or advances the batch.
    ///
    /// The lock is released while the encoder shuts down. The job keeps the
    /// slot meanwhile, so new conversions are still rejected.
    async fn stop_current(&self, abort_batch: bool) {
        let (job_id, handle, output) = {
            let mut inner = self.shared.inner.lock().await;
            if abort_batch {
                if let Some(batch) = inner.batch.as_mut() {
                    batch.abort_requested = true;
                }
            }

            if inner.job.is_none() {
                if inner.batch.is_some() {
                    self.settle_batch(&mut inner).await;
                }
                return;
            }
            let Some(job) = inner.job.as_mut() else {
                return;
            };
            job.stopping = true;
            (
                job.id,
                Arc::clone(&job.handle),
                job.request.output_path.clone(),
            )
        };

        debug!(job_id, "Stopping conversion");
        handle.cancel().await;
        remove_partial_output(&output).await;

        let mut inner = self.shared.inner.lock().await;
        if inner.job.as_ref().map(|job| job.id) != Some(job_id) {
            // A concurrent stop already finished this job
            return;
        }
        if let Some(job) = inner.job.take() {
            self.complete(&mut inner, job, JobOutcome::Canceled);
        }
        self.settle_batch(&mut inner).await;
    }

    /// Ends the batch if an abort was requested, otherwise starts its next item.
    async fn settle_batch(&self, inner: &mut Inner) {
        let aborted = inner
            .batch
            .as_ref()
            .is_some_and(|batch| batch.abort_requested);
        if aborted {
            self.end_batch(inner, true);
        } else {
            self.advance_batch(inner).await;
        }
    }
}

/// Rejects a missing input and an output that would overwrite the input.
async fn validate_paths(request: &ConversionRequest) -> Result<(), OrchestratorError> {
    let input = &request.input_path;
    if !tokio::fs::try_exists(input).await.unwrap_or(false) {
        return Err(OrchestratorError::invalid(format!(
            "input file does not exist: {}",
            input.display()
        )));
    }
    if same_file(input, &request.output_path).await {
        return Err(OrchestratorError::invalid(format!(
            "output would overwrite input: {}",
            input.display()
        )));
    }
    Ok(())
}

async fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

async fn remove_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial output"),
    }
}

/// Builds a failure message from the exit status and the last diagnostic lines.
fn failure_message(program: &str, exit: &ProcessExit) -> String {
    let lines: Vec<&str> = exit
        .diagnostics
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let tail = &lines[lines.len().saturating_sub(FAILURE_MESSAGE_LINES)..];

    if tail.is_empty() {
        format!("{} {}", program, exit.describe())
    } else {
        format!("{} {}: {}", program, exit.describe(), tail.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{AdapterInfo, ConversionOptions, LameAdapter};
    use crate::process::ExitKind;
    use std::path::PathBuf;

    #[test]
    fn test_failure_message_keeps_last_lines() {
        let exit = ProcessExit {
            code: Some(1),
            kind: ExitKind::Normal,
            diagnostics: "one\ntwo\r\nthree\nfour\n\nfive\nsix\n".to_string(),
        };
        assert_eq!(
            failure_message("flac", &exit),
            "flac exited with code 1: two\nthree\nfour\nfive\nsix"
        );
    }

    #[test]
    fn test_failure_message_without_diagnostics() {
        let exit = ProcessExit {
            code: None,
            kind: ExitKind::Abnormal,
            diagnostics: "  \n".to_string(),
        };
        assert_eq!(failure_message("lame", &exit), "lame terminated abnormally");
    }

    fn orchestrator_without_tools() -> ConversionOrchestrator {
        let registry = AdapterRegistry::from_probed(vec![(
            Arc::new(LameAdapter::default()) as Arc<dyn EncoderAdapter>,
            AdapterInfo::unavailable(AudioFormat::Mp3),
        )]);
        ConversionOrchestrator::new(
            registry,
            OrchestratorConfig::default(),
            ProcessConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unavailable_tool_rejected_while_idle() {
        let orchestrator = orchestrator_without_tools();
        let mut events = orchestrator.subscribe().await;

        let request = ConversionRequest::new(
            "song.wav",
            "song.mp3",
            ConversionOptions::new(AudioFormat::Mp3),
        );
        let err = orchestrator.convert_async(request).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::ToolUnavailable { .. }));
        assert_eq!(orchestrator.state().await, ConversionState::Idle);
        assert!(orchestrator.status().await.is_none());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unregistered_format() {
        let orchestrator = orchestrator_without_tools();
        let request = ConversionRequest::new(
            "song.wav",
            "song.flac",
            ConversionOptions::new(AudioFormat::Flac),
        );
        let err = orchestrator.convert(request).await.unwrap_err();
        assert_eq!(err, OrchestratorError::UnsupportedFormat("flac".to_string()));
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_noop() {
        let orchestrator = orchestrator_without_tools();
        let mut events = orchestrator.subscribe().await;

        orchestrator.cancel().await;
        orchestrator.cancel().await;
        orchestrator.skip().await;

        assert_eq!(orchestrator.state().await, ConversionState::Idle);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let orchestrator = orchestrator_without_tools();
        let err = orchestrator
            .convert_batch(BatchRequest::new(
                Vec::new(),
                ConversionOptions::new(AudioFormat::Mp3),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_batch_with_missing_directory_rejected() {
        let orchestrator = orchestrator_without_tools();
        let request = BatchRequest::new(
            vec![PathBuf::from("a.wav")],
            ConversionOptions::new(AudioFormat::Mp3),
        )
        .with_output_dir("/nonexistent/audioconv-out");

        let err = orchestrator.convert_batch(request).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidRequest(_)));
        assert_eq!(orchestrator.state().await, ConversionState::Idle);
    }

    #[test]
    fn test_default_format_falls_back() {
        let orchestrator = orchestrator_without_tools();
        assert_eq!(orchestrator.default_format(), None);
    }
}
