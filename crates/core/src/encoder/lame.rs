//! MP3 adapter driving LAME.

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
    Lazy::new(|| Regex::new(r"LAME.*version ([0-9.]+)").unwrap());

/// LAME prints a frame table whose rows end in "( 45%)" on stderr.
static PROGRESS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\s*\d+)%\)").unwrap());

/// Adapter for MP3 output.
#[derive(Debug, Clone, Default)]
pub struct LameAdapter {
    config: EncoderConfig,
}

impl LameAdapter {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EncoderAdapter for LameAdapter {
    fn format(&self) -> AudioFormat {
        AudioFormat::Mp3
    }

    fn executable_name(&self) -> &str {
        "lame"
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

        // VBR (V0 is best) wins over CBR
        if let Some(quality) = options.vbr_quality {
            plan.arg("-V").arg(quality.to_string());
        } else {
            plan.arg("-b").arg(options.effective_bitrate().to_string());
        }

        // LAME takes kHz, e.g. 44.1
        if let Some(hz) = options.resample_hz() {
            plan.arg("--resample").arg((hz as f64 / 1000.0).to_string());
        }

        match options.channels {
            ChannelMode::Mono => {
                plan.arg("-m").arg("m");
            }
            ChannelMode::Stereo => {
                plan.arg("-m").arg("s");
            }
            ChannelMode::Preserve => {}
        }

        // Best algorithm quality, ID3v2 tags, no histogram. No --silent so progress stays.
        plan.arg("-q").arg("0").arg("--id3v2-only").arg("--nohist");

        plan.arg(&request.input_path).arg(&request.output_path);
        plan
    }

    fn parse_progress(&self, chunk: &str) -> Option<u8> {
        last_capture(&PROGRESS_PATTERN, chunk).and_then(integer_percent)
    }

    fn presets(&self) -> Vec<QualityPreset> {
        vec![
            QualityPreset::default_choice("320 kbps (Highest)", QualitySetting::Bitrate(320)),
            QualityPreset::new("256 kbps", QualitySetting::Bitrate(256)),
            QualityPreset::new("192 kbps (Good)", QualitySetting::Bitrate(192)),
            QualityPreset::new("128 kbps (Medium)", QualitySetting::Bitrate(128)),
            QualityPreset::new("96 kbps (Low)", QualitySetting::Bitrate(96)),
            QualityPreset::new("V0 (VBR ~245 kbps)", QualitySetting::Vbr(0)),
            QualityPreset::new("V2 (VBR ~190 kbps)", QualitySetting::Vbr(2)),
        ]
    }
}
