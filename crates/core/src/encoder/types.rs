//! Types for the encoder module.

use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Bitrate rendered when a bitrate-based format gets neither a bitrate nor a VBR quality.
pub const DEFAULT_BITRATE_KBPS: u32 = 320;

/// FLAC compression level used when none is given.
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 8;

/// Target audio format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// Free Lossless Audio Codec (lossless)
    Flac,
    /// MPEG Audio Layer III, encoded with LAME
    Mp3,
    /// Ogg Vorbis, encoded with oggenc
    Ogg,
    /// Opus, encoded with opusenc
    Opus,
}

impl AudioFormat {
    /// All formats, in registry order.
    pub const ALL: [AudioFormat; 4] = [Self::Flac, Self::Mp3, Self::Ogg, Self::Opus];

    /// Returns the format identifier ("flac", "mp3", ...).
    pub fn id(&self) -> &'static str {
        match self {
            Self::Flac => "flac",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
            Self::Opus => "opus",
        }
    }

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        self.id()
    }

    /// Whether this format is lossless.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Flac)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Error returned when a format identifier has no matching format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported format: {0}")]
pub struct UnknownFormat(pub String);

impl FromStr for AudioFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flac" => Ok(Self::Flac),
            "mp3" => Ok(Self::Mp3),
            "ogg" | "vorbis" => Ok(Self::Ogg),
            "opus" => Ok(Self::Opus),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Channel layout of the output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMode {
    /// Keep whatever the source has.
    #[default]
    Preserve,
    /// Downmix to a single channel.
    Mono,
    /// Force two channels.
    Stereo,
}

impl ChannelMode {
    /// Maps a channel count (0 = preserve, 1 = mono, 2 = stereo).
    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            0 => Some(Self::Preserve),
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            _ => None,
        }
    }
}

/// Options shared by every conversion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Target format.
    pub format: AudioFormat,
    /// Target bitrate in kbps (bitrate-based formats).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    /// VBR quality index. Takes precedence over the bitrate when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vbr_quality: Option<u8>,
    /// Output sample rate in Hz. None or 0 keeps the source rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate_hz: Option<u32>,
    /// Output channel layout.
    #[serde(default)]
    pub channels: ChannelMode,
    /// Compression level for lossless output (0-8).
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,
}

fn default_compression_level() -> u8 {
    DEFAULT_COMPRESSION_LEVEL
}

impl ConversionOptions {
    /// Creates options for a format with every other setting at its default.
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            bitrate_kbps: None,
            vbr_quality: None,
            sample_rate_hz: None,
            channels: ChannelMode::Preserve,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Sets a constant/average bitrate and clears any VBR quality.
    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        QualitySetting::Bitrate(kbps).apply(&mut self);
        self
    }

    /// Sets a VBR quality index and clears any bitrate.
    pub fn with_vbr_quality(mut self, quality: u8) -> Self {
        QualitySetting::Vbr(quality).apply(&mut self);
        self
    }

    /// Sets the output sample rate.
    pub fn with_sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate_hz = Some(hz);
        self
    }

    /// Sets the output channel layout.
    pub fn with_channels(mut self, channels: ChannelMode) -> Self {
        self.channels = channels;
        self
    }

    /// Sets the lossless compression level.
    pub fn with_compression_level(mut self, level: u8) -> Self {
        self.compression_level = level;
        self
    }

    /// Sample rate to resample to, if any. Zero means preserve.
    pub fn resample_hz(&self) -> Option<u32> {
        self.sample_rate_hz.filter(|hz| *hz > 0)
    }

    /// Bitrate to render when no VBR quality is active.
    pub fn effective_bitrate(&self) -> u32 {
        self.bitrate_kbps.unwrap_or(DEFAULT_BITRATE_KBPS)
    }
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self::new(AudioFormat::Flac)
    }
}

/// One quality knob, as picked from a preset list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum QualitySetting {
    /// Constant or average bitrate in kbps.
    Bitrate(u32),
    /// VBR quality index.
    Vbr(u8),
    /// Lossless compression level.
    CompressionLevel(u8),
}

impl QualitySetting {
    /// Writes this setting into the options, clearing the competing mode.
    pub fn apply(&self, options: &mut ConversionOptions) {
        match *self {
            Self::Bitrate(kbps) => {
                options.bitrate_kbps = Some(kbps);
                options.vbr_quality = None;
            }
            Self::Vbr(quality) => {
                options.vbr_quality = Some(quality);
                options.bitrate_kbps = None;
            }
            Self::CompressionLevel(level) => {
                options.compression_level = level;
                options.bitrate_kbps = None;
                options.vbr_quality = None;
            }
        }
    }
}

/// A labelled quality choice offered by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityPreset {
    pub label: &'static str,
    pub setting: QualitySetting,
    /// Whether callers should pre-select this preset.
    pub is_default: bool,
}

impl QualityPreset {
    pub(crate) const fn new(label: &'static str, setting: QualitySetting) -> Self {
        Self {
            label,
            setting,
            is_default: false,
        }
    }

    pub(crate) const fn default_choice(label: &'static str, setting: QualitySetting) -> Self {
        Self {
            label,
            setting,
            is_default: true,
        }
    }
}

/// A request to convert one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        options: ConversionOptions,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            options,
        }
    }

    /// Builds a request whose output sits next to the input with the format's extension.
    pub fn alongside(input_path: impl Into<PathBuf>, options: ConversionOptions) -> Self {
        let input_path = input_path.into();
        let output_path = output_path_in(
            input_path.parent().unwrap_or_else(|| Path::new("")),
            &input_path,
            options.format,
        );
        Self {
            input_path,
            output_path,
            options,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.options.format
    }
}

/// Joins `dir` with the input's base name and the format's extension.
///
/// Only the last extension of the input is replaced, so `live.take2.wav` becomes
/// `live.take2.flac`. The name is kept byte for byte, including non-UTF-8 names.
pub fn output_path_in(dir: &Path, input_path: &Path, format: AudioFormat) -> PathBuf {
    let mut name = input_path
        .file_stem()
        .map(OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".");
    name.push(format.extension());
    dir.join(name)
}

/// The argument list for one encoder invocation.
///
/// Paths go in as `OsStr`, so file names reach the encoder unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    program: String,
    args: Vec<OsString>,
}

impl ExecutionPlan {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Executable name the plan was built for.
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Arguments as text, with invalid UTF-8 replaced.
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    /// Renders the plan as a shell-like line for logs.
    pub fn display_command(&self) -> String {
        let mut line = self.program.clone();
        for arg in self.args_lossy() {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push('"');
                line.push_str(&arg);
                line.push('"');
            } else {
                line.push_str(&arg);
            }
        }
        line
    }
}

/// Output stream of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Which output streams carry a tool's progress text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStreams {
    Stderr,
    Stdout,
    Both,
}

impl ProgressStreams {
    pub fn accepts(&self, stream: OutputStream) -> bool {
        matches!(
            (self, stream),
            (Self::Both, _)
                | (Self::Stderr, OutputStream::Stderr)
                | (Self::Stdout, OutputStream::Stdout)
        )
    }
}

/// Result of probing the host for an adapter's tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    pub format: AudioFormat,
    pub tool_available: bool,
    pub tool_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<PathBuf>,
}

impl AdapterInfo {
    /// Version string reported when the tool is missing.
    pub const NOT_FOUND: &'static str = "Not found";
    /// Version string reported when the banner could not be parsed.
    pub const UNKNOWN_VERSION: &'static str = "Unknown";

    pub fn unavailable(format: AudioFormat) -> Self {
        Self {
            format,
            tool_available: false,
            tool_version: Self::NOT_FOUND.to_string(),
            executable_path: None,
        }
    }

    pub fn available(format: AudioFormat, executable_path: PathBuf, version: String) -> Self {
        Self {
            format,
            tool_available: true,
            tool_version: version,
            executable_path: Some(executable_path),
        }
    }
}
