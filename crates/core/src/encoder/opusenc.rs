//! Opus adapter driving `opusenc` from opus-tools.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::config::EncoderConfig;
use super::probe::probe_tool;
use super::progress::{integer_percent, last_capture};
use super::traits::EncoderAdapter;
use super::types::{
    AdapterInfo, AudioFormat, ChannelMode, ConversionRequest, ExecutionPlan, QualityPreset,
    QualitySetting,
};

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"opusenc.*opus-tools ([0-9.]+)").unwrap());

static PROGRESS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*(\d+)%\]").unwrap());

/// Encoder complexity, 0-10.
const COMPLEXITY: &str = "10";

/// Adapter for Opus output.
///
/// Opus is bitrate-only; a VBR quality on the request is ignored. opusenc
/// resamples to 48 kHz internally, so no resample flag is rendered either.
#[derive(Debug, Clone, Default)]
pub struct OpusencAdapter {
    config: EncoderConfig,
}

impl OpusencAdapter {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EncoderAdapter for OpusencAdapter {
    fn format(&self) -> AudioFormat {
        AudioFormat::Opus
    }

    fn executable_name(&self) -> &str {
        "opusenc"
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
        let mut plan = ExecutionPlan::new(self.executable_name());
        plan.arg("--bitrate")
            .arg(options.effective_bitrate().to_string())
            .arg("--vbr")
            .arg("--comp")
            .arg(COMPLEXITY);

        if options.channels == ChannelMode::Mono {
            plan.arg("--downmix-mono");
        }

        plan.arg(&request.input_path).arg(&request.output_path);
        plan
    }

    fn parse_progress(&self, chunk: &str) -> Option<u8> {
        last_capture(&PROGRESS_PATTERN, chunk).and_then(integer_percent)
    }

    fn presets(&self) -> Vec<QualityPreset> {
        vec![
            QualityPreset::new("256 kbps (Highest)", QualitySetting::Bitrate(256)),
            QualityPreset::new("192 kbps", QualitySetting::Bitrate(192)),
            QualityPreset::default_choice("128 kbps (Good)", QualitySetting::Bitrate(128)),
            QualityPreset::new("96 kbps (Medium)", QualitySetting::Bitrate(96)),
            QualityPreset::new("64 kbps (Low)", QualitySetting::Bitrate(64)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::types::ConversionOptions;

    fn plan(options: ConversionOptions) -> Vec<String> {
        OpusencAdapter::default()
            .build_plan(&ConversionRequest::new("in.flac", "out.opus", options))
            .args_lossy()
    }

    #[test]
    fn test_bitrate_plan() {
        let args = plan(ConversionOptions::new(AudioFormat::Opus).with_bitrate(128));
        assert_eq!(
            args,
            ["--bitrate", "128", "--vbr", "--comp", "10", "in.flac", "out.opus"]
        );
    }

    #[test]
    fn test_vbr_quality_is_ignored() {
        let args = plan(ConversionOptions::new(AudioFormat::Opus).with_vbr_quality(5));
        assert_eq!(&args[..2], ["--bitrate", "320"]);
        assert!(!args.contains(&"5".to_string()));
    }

    #[test]
    fn test_downmix_and_no_resample() {
        let args = plan(
            ConversionOptions::new(AudioFormat::Opus)
                .with_bitrate(64)
                .with_sample_rate(44100)
                .with_channels(ChannelMode::Mono),
        );
        assert!(args.contains(&"--downmix-mono".to_string()));
        assert!(!args.iter().any(|a| a.contains("resample") || a == "44100"));
    }

    #[test]
    fn test_parse_progress() {
        let adapter = OpusencAdapter::default();
        assert_eq!(adapter.parse_progress("\r[ 45%] 00:00:03.12 31.4x realtime"), Some(45));
        assert_eq!(adapter.parse_progress("[100%]"), Some(100));
        assert_eq!(adapter.parse_progress("[ 45.5%]"), None);
        assert_eq!(adapter.parse_progress("Encoding using libopus"), None);
    }
}
