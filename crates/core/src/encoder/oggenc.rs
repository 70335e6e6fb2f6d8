//! Ogg Vorbis adapter driving `oggenc` from vorbis-tools.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::config::EncoderConfig;
use super::probe::probe_tool;
use super::progress::{fractional_percent, last_capture};
use super::traits::EncoderAdapter;
use super::types::{
    AdapterInfo, AudioFormat, ChannelMode, ConversionRequest, ExecutionPlan, ProgressStreams,
    QualityPreset, QualitySetting,
};

static VERSION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"oggenc.*vorbis-tools ([0-9.]+)").unwrap());

/// oggenc prints "\t[ 45.0%] [ 0m03s remaining]".
static PROGRESS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*([0-9.]+)%\]").unwrap());

/// Adapter for Ogg Vorbis output.
#[derive(Debug, Clone, Default)]
pub struct OggencAdapter {
    config: EncoderConfig,
}

impl OggencAdapter {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EncoderAdapter for OggencAdapter {
    fn format(&self) -> AudioFormat {
        AudioFormat::Ogg
    }

    fn executable_name(&self) -> &str {
        "oggenc"
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

        // Quality index (10 is best) wins over average bitrate
        if let Some(quality) = options.vbr_quality {
            plan.arg("-q").arg(quality.to_string());
        } else {
            plan.arg("-b").arg(options.effective_bitrate().to_string());
        }

        if let Some(hz) = options.resample_hz() {
            plan.arg("--resample").arg(hz.to_string());
        }

        if options.channels == ChannelMode::Mono {
            plan.arg("--downmix");
        }

        plan.arg("-o")
            .arg(&request.output_path)
            .arg(&request.input_path);
        plan
    }

    fn parse_progress(&self, chunk: &str) -> Option<u8> {
        last_capture(&PROGRESS_PATTERN, chunk).and_then(fractional_percent)
    }

    fn progress_streams(&self) -> ProgressStreams {
        ProgressStreams::Both
    }

    fn presets(&self) -> Vec<QualityPreset> {
        vec![
            QualityPreset::new("Quality 10 (Highest ~500 kbps)", QualitySetting::Vbr(10)),
            QualityPreset::default_choice("Quality 8 (~256 kbps)", QualitySetting::Vbr(8)),
            QualityPreset::new("Quality 6 (~192 kbps)", QualitySetting::Vbr(6)),
            QualityPreset::new("Quality 4 (~128 kbps)", QualitySetting::Vbr(4)),
            QualityPreset::new("Quality 2 (~96 kbps)", QualitySetting::Vbr(2)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::types::{ConversionOptions, OutputStream};

    fn plan(options: ConversionOptions) -> Vec<String> {
        OggencAdapter::default()
            .build_plan(&ConversionRequest::new("in.flac", "out.ogg", options))
            .args_lossy()
    }

    #[test]
    fn test_quality_mode() {
        let args = plan(ConversionOptions::new(AudioFormat::Ogg).with_vbr_quality(8));
        assert_eq!(args, ["-q", "8", "-o", "out.ogg", "in.flac"]);
    }

    #[test]
    fn test_average_bitrate_mode() {
        let args = plan(ConversionOptions::new(AudioFormat::Ogg).with_bitrate(160));
        assert_eq!(args, ["-b", "160", "-o", "out.ogg", "in.flac"]);
        assert!(!args.contains(&"-q".to_string()));
    }

    #[test]
    fn test_resample_in_hz_and_downmix() {
        let args = plan(
            ConversionOptions::new(AudioFormat::Ogg)
                .with_vbr_quality(4)
                .with_sample_rate(44100)
                .with_channels(ChannelMode::Mono),
        );
        assert_eq!(
            args,
            [
                "-q",
                "4",
                "--resample",
                "44100",
                "--downmix",
                "-o",
                "out.ogg",
                "in.flac"
            ]
        );
    }

    #[test]
    fn test_stereo_adds_no_flag() {
        let args = plan(
            ConversionOptions::new(AudioFormat::Ogg)
                .with_vbr_quality(4)
                .with_channels(ChannelMode::Stereo),
        );
        assert!(!args.contains(&"--downmix".to_string()));
    }

    #[test]
    fn test_parse_progress_fractional() {
        let adapter = OggencAdapter::default();
        assert_eq!(
            adapter.parse_progress("\t[ 45.7%] [ 0m03s remaining] -"),
            Some(45)
        );
        assert_eq!(adapter.parse_progress("[100.0%]"), Some(100));
        assert_eq!(adapter.parse_progress("[ 12%]"), Some(12));
        assert_eq!(adapter.parse_progress("[ 1.2.3%]"), None);
        assert_eq!(adapter.parse_progress("Opening with wav module"), None);
    }

    #[test]
    fn test_reads_both_streams() {
        let adapter = OggencAdapter::default();
        assert!(adapter.progress_streams().accepts(OutputStream::Stdout));
        assert!(adapter.progress_streams().accepts(OutputStream::Stderr));
    }
}
