//! Encoder adapters for the external command-line tools.
//!
//! Each adapter knows how to find one tool, read its version, render a
//! conversion request into that tool's arguments and pick progress
//! percentages out of its console output.
//!
//! | Format | Tool      | Progress text         | Stream        |
//! |--------|-----------|-----------------------|---------------|
//! | flac   | `flac`    | `45% complete`        | stderr        |
//! | mp3    | `lame`    | `( 45%)`              | stderr        |
//! | ogg    | `oggenc`  | `[ 45.0%]`            | stdout/stderr |
//! | opus   | `opusenc` | `[ 45%]`              | stderr        |
//!
//! # Example
//!
//! ```ignore
//! use audioconv_core::encoder::{
//!     AudioFormat, ConversionOptions, ConversionRequest, EncoderAdapter, LameAdapter,
//! };
//!
//! let adapter = LameAdapter::default();
//! let info = adapter.probe().await;
//! println!("lame available: {} ({})", info.tool_available, info.tool_version);
//!
//! let request = ConversionRequest::new(
//!     "song.wav",
//!     "song.mp3",
//!     ConversionOptions::new(AudioFormat::Mp3).with_vbr_quality(2),
//! );
//! let plan = adapter.build_plan(&request);
//! assert_eq!(&plan.args_lossy()[..2], ["-V", "2"]);
//! ```

mod config;
mod flac;
mod lame;
mod oggenc;
mod opusenc;
mod probe;
pub(crate) mod progress;
mod traits;
mod types;

use std::sync::Arc;

pub use config::EncoderConfig;
pub use flac::FlacAdapter;
pub use lame::LameAdapter;
pub use oggenc::OggencAdapter;
pub use opusenc::OpusencAdapter;
pub use probe::{locate, parse_version};
pub use traits::EncoderAdapter;
pub use types::{
    output_path_in, AdapterInfo, AudioFormat, ChannelMode, ConversionOptions, ConversionRequest,
    ExecutionPlan, OutputStream, ProgressStreams, QualityPreset, QualitySetting, UnknownFormat,
    DEFAULT_BITRATE_KBPS, DEFAULT_COMPRESSION_LEVEL,
};

/// Creates one adapter per supported format.
pub fn default_adapters(config: &EncoderConfig) -> Vec<Arc<dyn EncoderAdapter>> {
    vec![
        Arc::new(FlacAdapter::new(config.clone())),
        Arc::new(LameAdapter::new(config.clone())),
        Arc::new(OggencAdapter::new(config.clone())),
        Arc::new(OpusencAdapter::new(config.clone())),
    ]
}
