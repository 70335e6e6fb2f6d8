//! Scripted encoder adapter for testing.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::encoder::progress::{integer_percent, last_capture};
use crate::encoder::{
    AdapterInfo, AudioFormat, ConversionRequest, EncoderAdapter, ExecutionPlan, ProgressStreams,
    QualityPreset, QualitySetting,
};

/// Same progress text as LAME: `( 45%)`.
static PROGRESS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*(\d+)%\)").unwrap());

/// Version string reported by the mock.
pub const MOCK_VERSION: &str = "mock-1.0";

/// Adapter that runs a shell script in place of a real encoder.
///
/// The script runs as `sh -c <script> mock <input> <output>`, so it sees
/// the input path as `$1` and the output path as `$2`. Progress is parsed
/// from `( NN%)` text, like LAME prints it.
///
/// # Example
///
/// ```rust,ignore
/// use audioconv_core::testing::{fixtures, MockAdapter};
///
/// let adapter = MockAdapter::new(AudioFormat::Mp3, fixtures::COPY_INPUT);
/// adapter.set_script(fixtures::fail(2, "bad header"));
///
/// // Build an orchestrator around it, convert, then
/// assert_eq!(adapter.plan_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockAdapter {
    format: AudioFormat,
    available: bool,
    progress_streams: ProgressStreams,
    /// Script run for every conversion.
    script: Arc<RwLock<String>>,
    /// Plans built so far.
    plans: Arc<RwLock<Vec<ExecutionPlan>>>,
}

impl MockAdapter {
    /// Create a mock whose tool is available.
    pub fn new(format: AudioFormat, script: impl Into<String>) -> Self {
        Self {
            format,
            available: true,
            progress_streams: ProgressStreams::Stderr,
            script: Arc::new(RwLock::new(script.into())),
            plans: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create a mock whose tool is missing.
    pub fn unavailable(format: AudioFormat) -> Self {
        Self {
            available: false,
            ..Self::new(format, "true")
        }
    }

    /// Parse progress from other streams than stderr.
    pub fn with_progress_streams(mut self, streams: ProgressStreams) -> Self {
        self.progress_streams = streams;
        self
    }

    /// Replace the script used by later conversions.
    pub fn set_script(&self, script: impl Into<String>) {
        *self.script.write().unwrap_or_else(|e| e.into_inner()) = script.into();
    }

    /// Plans built so far, oldest first.
    pub fn recorded_plans(&self) -> Vec<ExecutionPlan> {
        self.plans.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of plans built.
    pub fn plan_count(&self) -> usize {
        self.plans.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl EncoderAdapter for MockAdapter {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn executable_name(&self) -> &str {
        "sh"
    }

    async fn probe(&self) -> AdapterInfo {
        if !self.available {
            return AdapterInfo::unavailable(self.format);
        }
        let path = which::which("sh").unwrap_or_else(|_| PathBuf::from("/bin/sh"));
        AdapterInfo::available(self.format, path, MOCK_VERSION.to_string())
    }

    fn build_plan(&self, request: &ConversionRequest) -> ExecutionPlan {
        let script = self.script.read().unwrap_or_else(|e| e.into_inner()).clone();
        let mut plan = ExecutionPlan::new(self.executable_name());
        plan.arg("-c")
            .arg(script)
            .arg("mock")
            .arg(&request.input_path)
            .arg(&request.output_path);
        self.plans
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(plan.clone());
        plan
    }

    fn parse_progress(&self, chunk: &str) -> Option<u8> {
        last_capture(&PROGRESS_PATTERN, chunk).and_then(integer_percent)
    }

    fn progress_streams(&self) -> ProgressStreams {
        self.progress_streams
    }

    fn presets(&self) -> Vec<QualityPreset> {
        vec![QualityPreset::default_choice(
            "Mock",
            QualitySetting::Bitrate(128),
        )]
    }
}
