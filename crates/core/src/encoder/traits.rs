//! Trait definitions for the encoder module.

use async_trait::async_trait;

use super::types::{
    AdapterInfo, AudioFormat, ConversionRequest, ExecutionPlan, ProgressStreams, QualityPreset,
};

/// Adapter over one external command-line encoder.
///
/// Implementations differ only in the tool they look up, the argument table
/// they render and the progress text they recognise.
#[async_trait]
pub trait EncoderAdapter: Send + Sync {
    /// Format this adapter produces.
    fn format(&self) -> AudioFormat;

    /// Literal name used to look up and invoke the tool.
    fn executable_name(&self) -> &str;

    /// Locates the tool and reads its version.
    ///
    /// A missing tool is reported as unavailable, never as an error.
    async fn probe(&self) -> AdapterInfo;

    /// Renders a request into the tool's argument list.
    ///
    /// Never fails: options are rendered as given, without semantic checks.
    fn build_plan(&self, request: &ConversionRequest) -> ExecutionPlan;

    /// Extracts a percentage from one chunk of tool output, clamped to 0..=100.
    fn parse_progress(&self, chunk: &str) -> Option<u8>;

    /// Streams the progress text is written to.
    fn progress_streams(&self) -> ProgressStreams {
        ProgressStreams::Stderr
    }

    /// Quality choices offered to callers.
    fn presets(&self) -> Vec<QualityPreset> {
        Vec::new()
    }

    /// Extension of the files this adapter writes.
    fn output_extension(&self) -> &'static str {
        self.format().extension()
    }
}
