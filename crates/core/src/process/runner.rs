//! Supervision of a single external process.
//!
//! A [`ProcessRunner`] launches at most one child at a time. Everything the
//! child writes is forwarded as [`ProcessEvent::Output`] chunks in arrival
//! order, followed by exactly one terminal event. A launch failure is
//! reported the same way, as a terminal [`ProcessEvent::SpawnFailed`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::ProcessConfig;
use super::error::ProcessError;
use crate::encoder::OutputStream;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// The process returned an exit code.
    Normal,
    /// The process was terminated by a signal or the exit status was unreadable.
    Abnormal,
}

/// Terminal information for a process that ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub kind: ExitKind,
    /// The last bytes the process wrote to stderr.
    pub diagnostics: String,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.kind == ExitKind::Normal && self.code == Some(0)
    }

    /// Short description of a failed exit, for error messages.
    pub fn describe(&self) -> String {
        match (self.kind, self.code) {
            (ExitKind::Normal, Some(code)) => format!("exited with code {}", code),
            _ => "terminated abnormally".to_string(),
        }
    }
}

/// Notifications from a supervised process.
#[derive(Debug)]
pub enum ProcessEvent {
    /// A chunk of text from stdout or stderr.
    Output { stream: OutputStream, text: String },
    /// The process ended. Always the last event.
    Exited(ProcessExit),
    /// The process could not be started. Always the only event.
    SpawnFailed(ProcessError),
}

/// Launches external programs, one at a time.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: ProcessConfig,
    busy: Arc<AtomicBool>,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(ProcessConfig::default())
    }
}

impl ProcessRunner {
    pub fn new(config: ProcessConfig) -> Self {
        Self {
            config,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a process launched by this runner is still being supervised.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Starts `program` with `args` and returns a handle plus its event stream.
    ///
    /// Only an overlapping launch is an error here. A program that cannot be
    /// started still yields a handle, and its receiver delivers a single
    /// [`ProcessEvent::SpawnFailed`]. Must be called within a tokio runtime.
    pub fn spawn(
        &self,
        program: &Path,
        args: &[OsString],
    ) -> Result<(ProcessHandle, mpsc::UnboundedReceiver<ProcessEvent>), ProcessError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(ProcessError::AlreadyRunning);
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = watch::channel(false);
        let detached = Arc::new(AtomicBool::new(false));

        debug!(program = %program.display(), ?args, "Spawning process");

        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let pid = match spawned {
            Ok(child) => {
                let pid = child.id();
                info!(program = %program.display(), pid, "Process started");
                let supervisor = Supervisor {
                    config: self.config.clone(),
                    events: event_tx,
                    detached: Arc::clone(&detached),
                    busy: Arc::clone(&self.busy),
                    finished: finished_tx,
                };
                tokio::spawn(supervisor.run(child, cancel_rx));
                pid
            }
            Err(e) => {
                warn!(program = %program.display(), error = %e, "Failed to start process");
                self.busy.store(false, Ordering::SeqCst);
                let _ = event_tx.send(ProcessEvent::SpawnFailed(ProcessError::spawn(program, e)));
                let _ = finished_tx.send(true);
                None
            }
        };

        let handle = ProcessHandle {
            program: program.to_path_buf(),
            pid,
            detached,
            cancel: Mutex::new(Some(cancel_tx)),
            finished: finished_rx,
        };
        Ok((handle, event_rx))
    }
}

/// Control handle for a launched process.
#[derive(Debug)]
pub struct ProcessHandle {
    program: PathBuf,
    pid: Option<u32>,
    detached: Arc<AtomicBool>,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
    finished: watch::Receiver<bool>,
}

impl ProcessHandle {
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// OS process id, if the process started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether supervision has ended.
    pub fn is_finished(&self) -> bool {
        *self.finished.borrow()
    }

    /// Waits until supervision has ended.
    pub async fn wait(&self) {
        let mut finished = self.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }

    /// Stops the process and waits until it is gone.
    ///
    /// Event delivery stops before the process is signalled, so no
    /// output or exit event is observed after this is called. The process
    /// gets a graceful stop request and the configured grace period before
    /// it is force-killed. Safe to call more than once, and on a process
    /// that has already exited.
    pub async fn cancel(&self) {
        self.detached.store(true, Ordering::SeqCst);
        if let Some(tx) = self.cancel.lock().await.take() {
            debug!(pid = ?self.pid, "Cancelling process");
            let _ = tx.send(());
        }
        self.wait().await;
    }
}

struct Supervisor {
    config: ProcessConfig,
    events: mpsc::UnboundedSender<ProcessEvent>,
    detached: Arc<AtomicBool>,
    busy: Arc<AtomicBool>,
    finished: watch::Sender<bool>,
}

impl Supervisor {
    async fn run(self, mut child: Child, mut cancel_rx: oneshot::Receiver<()>) {
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut stdout_buf = vec![0u8; self.config.read_buffer_bytes.max(1)];
        let mut stderr_buf = vec![0u8; self.config.read_buffer_bytes.max(1)];
        let mut diagnostics = DiagnosticTail::new(self.config.diagnostic_tail_bytes);
        let mut cancel_open = true;

        let exit = loop {
            tokio::select! {
                biased;

                request = &mut cancel_rx, if cancel_open => {
                    if request.is_ok() {
                        terminate(&mut child, &self.config).await;
                        break None;
                    }
                    // Handle dropped without cancelling; keep supervising
                    cancel_open = false;
                }

                chunk = read_chunk(&mut stdout, &mut stdout_buf), if stdout.is_some() => {
                    match chunk {
                        Some(text) => self.forward(ProcessEvent::Output {
                            stream: OutputStream::Stdout,
                            text,
                        }),
                        None => stdout = None,
                    }
                }

                chunk = read_chunk(&mut stderr, &mut stderr_buf), if stderr.is_some() => {
                    match chunk {
                        Some(text) => {
                            diagnostics.push(&text);
                            self.forward(ProcessEvent::Output {
                                stream: OutputStream::Stderr,
                                text,
                            });
                        }
                        None => stderr = None,
                    }
                }

                status = child.wait(), if stdout.is_none() && stderr.is_none() => {
                    break Some(match status {
                        Ok(status) => ProcessExit {
                            code: status.code(),
                            kind: if status.code().is_some() {
                                ExitKind::Normal
                            } else {
                                ExitKind::Abnormal
                            },
                            diagnostics: diagnostics.into_string(),
                        },
                        Err(e) => {
                            warn!(error = %e, "Failed to wait for process");
                            ProcessExit {
                                code: None,
                                kind: ExitKind::Abnormal,
                                diagnostics: ProcessError::Wait(e).to_string(),
                            }
                        }
                    });
                }
            }
        };

        if let Some(exit) = exit {
            debug!(code = ?exit.code, kind = ?exit.kind, "Process exited");
            self.forward(ProcessEvent::Exited(exit));
        }

        self.busy.store(false, Ordering::SeqCst);
        let _ = self.finished.send(true);
    }

    fn forward(&self, event: ProcessEvent) {
        if !self.detached.load(Ordering::SeqCst) {
            let _ = self.events.send(event);
        }
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    reader: &mut Option<R>,
    buf: &mut [u8],
) -> Option<String> {
    let reader = reader.as_mut()?;
    match reader.read(buf).await {
        Ok(0) => None,
        Ok(n) => Some(String::from_utf8_lossy(&buf[..n]).into_owned()),
        Err(e) => {
            debug!(error = %e, "Stream read failed, treating as closed");
            None
        }
    }
}

/// Graceful stop, then force-kill once the grace period runs out.
async fn terminate(child: &mut Child, config: &ProcessConfig) {
    if request_stop(child) && timeout(config.terminate_grace(), child.wait()).await.is_ok() {
        return;
    }

    warn!(
        pid = ?child.id(),
        grace_ms = config.terminate_grace_ms,
        "Process did not stop in time, killing"
    );
    let _ = child.start_kill();
    if timeout(config.kill_wait(), child.wait()).await.is_err() {
        warn!(pid = ?child.id(), "Killed process was not reaped in time");
    }
}

#[cfg(unix)]
fn request_stop(child: &mut Child) -> bool {
    let Some(pid) = child.id() else {
        // Already reaped
        return true;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory we own.
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn request_stop(child: &mut Child) -> bool {
    child.start_kill().is_ok()
}

/// Keeps the last `limit` bytes of a text stream.
#[derive(Debug)]
struct DiagnosticTail {
    text: String,
    limit: usize,
}

impl DiagnosticTail {
    fn new(limit: usize) -> Self {
        Self {
            text: String::new(),
            limit,
        }
    }

    fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        if self.text.len() > self.limit {
            let mut cut = self.text.len() - self.limit;
            while !self.text.is_char_boundary(cut) {
                cut += 1;
            }
            self.text.drain(..cut);
        }
    }

    fn into_string(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_diagnostic_tail_keeps_end() {
        let mut tail = DiagnosticTail::new(8);
        tail.push("hello ");
        tail.push("world!");
        assert_eq!(tail.into_string(), "o world!");
    }

    #[test]
    fn test_diagnostic_tail_respects_char_boundaries() {
        let mut tail = DiagnosticTail::new(3);
        tail.push("aé€");
        let text = tail.into_string();
        assert!(text.len() <= 3);
        assert_eq!(text, "€");
    }

    #[test]
    fn test_exit_success() {
        let exit = ProcessExit {
            code: Some(0),
            kind: ExitKind::Normal,
            diagnostics: String::new(),
        };
        assert!(exit.success());

        let failed = ProcessExit {
            code: Some(2),
            ..exit.clone()
        };
        assert!(!failed.success());
        assert_eq!(failed.describe(), "exited with code 2");

        let signaled = ProcessExit {
            code: None,
            kind: ExitKind::Abnormal,
            diagnostics: String::new(),
        };
        assert!(!signaled.success());
        assert_eq!(signaled.describe(), "terminated abnormally");
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<ProcessEvent>) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn sh(script: &str) -> Vec<OsString> {
        vec!["-c".into(), script.into()]
    }

    #[tokio::test]
    async fn test_spawn_failure_is_reported_as_event() {
        let runner = ProcessRunner::default();
        let (handle, rx) = runner
            .spawn(Path::new("/nonexistent/audioconv-missing-tool"), &[])
            .unwrap();

        let events = collect(rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ProcessEvent::SpawnFailed(err) => assert!(err.is_not_found()),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(handle.is_finished());
        assert!(handle.pid().is_none());
        assert!(!runner.is_busy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_precedes_exit() {
        let runner = ProcessRunner::default();
        let (_handle, rx) = runner
            .spawn(Path::new("sh"), &sh("echo out; echo err >&2; exit 3"))
            .unwrap();

        let events = collect(rx).await;
        let (last, output) = events.split_last().unwrap();

        let mut stdout = String::new();
        let mut stderr = String::new();
        for event in output {
            match event {
                ProcessEvent::Output {
                    stream: OutputStream::Stdout,
                    text,
                } => stdout.push_str(text),
                ProcessEvent::Output {
                    stream: OutputStream::Stderr,
                    text,
                } => stderr.push_str(text),
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(stdout, "out\n");
        assert_eq!(stderr, "err\n");

        match last {
            ProcessEvent::Exited(exit) => {
                assert_eq!(exit.code, Some(3));
                assert_eq!(exit.kind, ExitKind::Normal);
                assert_eq!(exit.diagnostics, "err\n");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_overlapping_spawn_rejected() {
        let runner = ProcessRunner::default();
        let (handle, _rx) = runner.spawn(Path::new("sh"), &sh("sleep 5")).unwrap();
        assert!(runner.is_busy());

        let second = runner.spawn(Path::new("sh"), &sh("true"));
        assert!(matches!(second, Err(ProcessError::AlreadyRunning)));

        handle.cancel().await;
        assert!(!runner.is_busy());
        assert!(runner.spawn(Path::new("sh"), &sh("true")).is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_suppresses_events() {
        let runner = ProcessRunner::default();
        let (handle, rx) = runner
            .spawn(Path::new("sh"), &sh("exec sleep 10"))
            .unwrap();

        handle.cancel().await;
        assert!(handle.is_finished());

        let events = collect(rx).await;
        assert!(
            !events.iter().any(|e| matches!(e, ProcessEvent::Exited(_))),
            "no exit event after cancel: {:?}",
            events
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_escalates_to_kill() {
        let config = ProcessConfig::default().with_terminate_grace(Duration::from_millis(200));
        let runner = ProcessRunner::new(config);
        let (handle, _rx) = runner
            .spawn(Path::new("sh"), &sh("trap '' TERM; while true; do sleep 1; done"))
            .unwrap();

        // Let the shell install its trap
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = Instant::now();
        handle.cancel().await;
        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(!runner.is_busy());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let runner = ProcessRunner::default();
        let (handle, _rx) = runner.spawn(Path::new("sh"), &sh("true")).unwrap();
        handle.wait().await;

        handle.cancel().await;
        handle.cancel().await;
        assert!(handle.is_finished());
    }
}
