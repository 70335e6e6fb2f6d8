//! Lossless adapter driving the reference `flac` encoder.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::config::EncoderConfig;
use super::probe::probe_tool;
use super::progress::{integer_percent, last_capture};
use super::traits::EncoderAdapter;
use super::types::{
    AdapterInfo, AudioFormat, ConversionRequest, ExecutionPlan, QualityPreset, QualitySetting,
};

static VERSION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"flac ([0-9.]+)").unwrap());

/// flac reports "track.wav: 45% complete, ratio=0.612" on stderr.
static PROGRESS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)% complete").unwrap());

/// Adapter for FLAC output.
#[derive(Debug, Clone, Default)]
pub struct FlacAdapter {
    config: EncoderConfig,
}

impl FlacAdapter {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EncoderAdapter for FlacAdapter {
    fn format(&self) -> AudioFormat {
        AudioFormat::Flac
    }

    fn executable_name(&self) -> &str {
        "flac"
    }

    async fn probe(&self) -> AdapterInfo {
        probe_tool(
            self.format(),
            self.executable_name(),
            &VERSION_PATTERN,
            &self.config,
        )
        .await
    }

    fn build_plan(&self, request: &ConversionRequest) -> ExecutionPlan {
        let options = &request.options;

        // No --silent: it suppresses the progress line.
        let mut plan = ExecutionPlan::new(self.executable_name());
        plan.arg(format!("-{}", options.compression_level))
            .arg("--force")
            .arg("--verify")
            .arg("--keep-foreign-metadata")
            .arg("-o")
            .arg(&request.output_path)
            // Input must be last
            .arg(&request.input_path);
        plan
    }

    fn parse_progress(&self, chunk: &str) -> Option<u8> {
        last_capture(&PROGRESS_PATTERN, chunk).and_then(integer_percent)
    }

    fn presets(&self) -> Vec<QualityPreset> {
        vec![
            QualityPreset::default_choice(
                "Compression Level 8 (Best)",
                QualitySetting::CompressionLevel(8),
            ),
            QualityPreset::new(
                "Compression Level 5 (Default)",
                QualitySetting::CompressionLevel(5),
            ),
            QualityPreset::new(
                "Compression Level 0 (Fastest)",
                QualitySetting::CompressionLevel(0),
            ),
        ]
    }
}
