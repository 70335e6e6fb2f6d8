//! Command-line argument definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use audioconv_core::{AudioFormat, ChannelMode, ConversionOptions};

#[derive(Parser, Debug)]
#[command(
    name = "audioconv",
    version,
    about = "Convert audio files with flac, lame, oggenc and opusenc"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file. Defaults to ./audioconv.toml when it exists.
    #[arg(long, global = true, value_name = "PATH", env = "AUDIOCONV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print Prometheus metrics to stdout before exiting.
    #[arg(long, global = true, default_value_t = false)]
    pub metrics: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Lists the supported formats and whether their encoder is installed
    Codecs(CodecsArgs),
    /// Converts a single file
    Convert(ConvertArgs),
    /// Converts several files one after another
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
pub struct CodecsArgs {
    /// Also list the quality presets of each format
    #[arg(long)]
    pub presets: bool,

    /// Print the probe results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// File to convert
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file (defaults to INPUT with the format's extension)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub encode: EncodeArgs,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Files to convert, in order
    #[arg(value_name = "INPUTS", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Write every output into this directory instead of next to its source
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    #[command(flatten)]
    pub encode: EncodeArgs,
}

/// Encoding options shared by `convert` and `batch`.
#[derive(Args, Debug, Default)]
pub struct EncodeArgs {
    /// Target format: flac, mp3, ogg or opus (defaults to the configured format)
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<AudioFormat>,

    /// Bitrate in kbps for mp3, ogg and opus
    #[arg(long, value_name = "KBPS", conflicts_with = "vbr_quality")]
    pub bitrate: Option<u32>,

    /// VBR quality index (mp3: 0-9, ogg: 0-10)
    #[arg(long, value_name = "INDEX", value_parser = clap::value_parser!(u8).range(0..=10))]
    pub vbr_quality: Option<u8>,

    /// Resample to this rate in Hz (0 keeps the source rate)
    #[arg(long, value_name = "HZ")]
    pub sample_rate: Option<u32>,

    /// Output channels: 0 keeps the source, 1 mono, 2 stereo
    #[arg(
        long,
        value_name = "N",
        default_value_t = 0,
        value_parser = clap::value_parser!(u8).range(0..=2)
    )]
    pub channels: u8,

    /// FLAC compression level, 0-8
    #[arg(long, value_name = "LEVEL", value_parser = clap::value_parser!(u8).range(0..=8))]
    pub compression_level: Option<u8>,
}

impl EncodeArgs {
    /// Builds conversion options for `format` from the flags.
    pub fn to_options(&self, format: AudioFormat) -> ConversionOptions {
        let mut options = ConversionOptions::new(format);
        if let Some(kbps) = self.bitrate {
            options = options.with_bitrate(kbps);
        }
        if let Some(quality) = self.vbr_quality {
            options = options.with_vbr_quality(quality);
        }
        if let Some(hz) = self.sample_rate {
            options = options.with_sample_rate(hz);
        }
        if let Some(channels) = ChannelMode::from_count(self.channels) {
            options = options.with_channels(channels);
        }
        if let Some(level) = self.compression_level {
            options = options.with_compression_level(level);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_parse_convert() {
        let cli = parse(&[
            "audioconv",
            "convert",
            "song.wav",
            "-o",
            "out/song.mp3",
            "-f",
            "MP3",
            "--vbr-quality",
            "2",
            "--channels",
            "1",
        ]);

        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.input, PathBuf::from("song.wav"));
        assert_eq!(args.output, Some(PathBuf::from("out/song.mp3")));
        assert_eq!(args.encode.format, Some(AudioFormat::Mp3));

        let options = args.encode.to_options(AudioFormat::Mp3);
        assert_eq!(options.vbr_quality, Some(2));
        assert_eq!(options.bitrate_kbps, None);
        assert_eq!(options.channels, ChannelMode::Mono);
    }

    #[test]
    fn test_parse_batch_with_global_flags() {
        let cli = parse(&[
            "audioconv",
            "batch",
            "a.wav",
            "b.wav",
            "--output-dir",
            "/tmp/out",
            "--bitrate",
            "192",
            "--metrics",
            "--config",
            "custom.toml",
        ]);

        assert!(cli.metrics);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        let Commands::Batch(args) = cli.command else {
            panic!("expected batch");
        };
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(args.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(
            args.encode.to_options(AudioFormat::Opus).bitrate_kbps,
            Some(192)
        );
    }

    #[test]
    fn test_bitrate_conflicts_with_vbr() {
        let result = Cli::try_parse_from([
            "audioconv",
            "convert",
            "a.wav",
            "--bitrate",
            "128",
            "--vbr-quality",
            "4",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        assert!(Cli::try_parse_from(["audioconv", "convert", "a.wav", "--channels", "3"]).is_err());
        assert!(Cli::try_parse_from([
            "audioconv",
            "convert",
            "a.wav",
            "--compression-level",
            "9"
        ])
        .is_err());
        assert!(Cli::try_parse_from(["audioconv", "convert", "a.wav", "-f", "wma"]).is_err());
    }

    #[test]
    fn test_batch_requires_inputs() {
        assert!(Cli::try_parse_from(["audioconv", "batch"]).is_err());
    }

    #[test]
    fn test_default_options() {
        let options = EncodeArgs::default().to_options(AudioFormat::Flac);
        assert_eq!(options, ConversionOptions::new(AudioFormat::Flac));
    }
}
