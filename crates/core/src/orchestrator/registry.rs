//! Registry of encoder adapters and their probed tools.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use super::types::OrchestratorError;
use crate::encoder::{AdapterInfo, AudioFormat, EncoderAdapter};

struct Entry {
    adapter: Arc<dyn EncoderAdapter>,
    info: AdapterInfo,
}

/// Maps each format to its adapter and the result of probing its tool.
///
/// Probing happens once, when the registry is built. Rebuild the registry
/// to pick up tools installed later.
#[derive(Default)]
pub struct AdapterRegistry {
    entries: BTreeMap<AudioFormat, Entry>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.values().map(|e| &e.info))
            .finish()
    }
}

impl AdapterRegistry {
    /// Probes every adapter and registers it under its format.
    pub async fn probe(adapters: Vec<Arc<dyn EncoderAdapter>>) -> Self {
        let mut probed = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let info = adapter.probe().await;
            probed.push((adapter, info));
        }
        let registry = Self::from_probed(probed);
        registry.log_available();
        registry
    }

    /// Registers adapters with already known probe results.
    ///
    /// A later adapter for the same format replaces an earlier one.
    pub fn from_probed(probed: Vec<(Arc<dyn EncoderAdapter>, AdapterInfo)>) -> Self {
        let entries = probed
            .into_iter()
            .map(|(adapter, info)| (adapter.format(), Entry { adapter, info }))
            .collect();
        Self { entries }
    }

    fn log_available(&self) {
        let available: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.info.tool_available)
            .map(|e| format!("{} ({})", e.info.format, e.info.tool_version))
            .collect();

        if available.is_empty() {
            warn!("No encoder tools found; install flac, lame, vorbis-tools or opus-tools");
        } else {
            info!("Available codecs: {}", available.join(", "));
        }
    }

    pub fn get(&self, format: AudioFormat) -> Option<&Arc<dyn EncoderAdapter>> {
        self.entries.get(&format).map(|e| &e.adapter)
    }

    pub fn info(&self, format: AudioFormat) -> Option<&AdapterInfo> {
        self.entries.get(&format).map(|e| &e.info)
    }

    /// Probe results for every registered format.
    pub fn infos(&self) -> Vec<AdapterInfo> {
        self.entries.values().map(|e| e.info.clone()).collect()
    }

    pub fn is_available(&self, format: AudioFormat) -> bool {
        self.info(format).is_some_and(|i| i.tool_available)
    }

    /// Formats whose tool was found.
    pub fn available_formats(&self) -> Vec<AudioFormat> {
        self.entries
            .values()
            .filter(|e| e.info.tool_available)
            .map(|e| e.info.format)
            .collect()
    }

    /// Probed version string, or `None` for an unregistered format.
    pub fn version(&self, format: AudioFormat) -> Option<&str> {
        self.info(format).map(|i| i.tool_version.as_str())
    }

    /// The hint when its tool is available, otherwise the first available format.
    pub fn preferred_format(&self, hint: AudioFormat) -> Option<AudioFormat> {
        if self.is_available(hint) {
            Some(hint)
        } else {
            self.available_formats().into_iter().next()
        }
    }

    /// Resolves a format id such as `"mp3"` to a registered format.
    pub fn format_by_id(&self, id: &str) -> Result<AudioFormat, OrchestratorError> {
        id.parse::<AudioFormat>()
            .ok()
            .filter(|format| self.entries.contains_key(format))
            .ok_or_else(|| OrchestratorError::UnsupportedFormat(id.to_string()))
    }

    /// Returns the adapter for `format` and the executable to launch.
    pub(crate) fn resolve(
        &self,
        format: AudioFormat,
    ) -> Result<(Arc<dyn EncoderAdapter>, PathBuf), OrchestratorError> {
        let entry = self
            .entries
            .get(&format)
            .ok_or_else(|| OrchestratorError::UnsupportedFormat(format.to_string()))?;

        if !entry.info.tool_available {
            return Err(OrchestratorError::ToolUnavailable {
                format,
                tool: entry.adapter.executable_name().to_string(),
            });
        }

        let program = entry
            .info
            .executable_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(entry.adapter.executable_name()));
        Ok((Arc::clone(&entry.adapter), program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::{FlacAdapter, LameAdapter, OpusencAdapter};

    fn registry() -> AdapterRegistry {
        AdapterRegistry::from_probed(vec![
            (
                Arc::new(FlacAdapter::default()) as Arc<dyn EncoderAdapter>,
                AdapterInfo::unavailable(AudioFormat::Flac),
            ),
            (
                Arc::new(LameAdapter::default()),
                AdapterInfo::available(
                    AudioFormat::Mp3,
                    PathBuf::from("/usr/bin/lame"),
                    "3.100".to_string(),
                ),
            ),
            (
                Arc::new(OpusencAdapter::default()),
                AdapterInfo::available(
                    AudioFormat::Opus,
                    PathBuf::from("/usr/bin/opusenc"),
                    AdapterInfo::UNKNOWN_VERSION.to_string(),
                ),
            ),
        ])
    }

    #[test]
    fn test_available_formats_and_versions() {
        let registry = registry();
        assert_eq!(
            registry.available_formats(),
            [AudioFormat::Mp3, AudioFormat::Opus]
        );
        assert_eq!(registry.version(AudioFormat::Flac), Some("Not found"));
        assert_eq!(registry.version(AudioFormat::Mp3), Some("3.100"));
        assert_eq!(registry.version(AudioFormat::Opus), Some("Unknown"));
        assert_eq!(registry.version(AudioFormat::Ogg), None);
        assert_eq!(registry.infos().len(), 3);
    }

    #[test]
    fn test_preferred_format() {
        let registry = registry();
        assert_eq!(
            registry.preferred_format(AudioFormat::Opus),
            Some(AudioFormat::Opus)
        );
        assert_eq!(
            registry.preferred_format(AudioFormat::Flac),
            Some(AudioFormat::Mp3)
        );
        assert_eq!(AdapterRegistry::default().preferred_format(AudioFormat::Flac), None);
    }

    #[test]
    fn test_resolve_errors() {
        let registry = registry();

        let err = registry.resolve(AudioFormat::Flac).err().unwrap();
        assert_eq!(
            err,
            OrchestratorError::ToolUnavailable {
                format: AudioFormat::Flac,
                tool: "flac".to_string()
            }
        );

        let err = registry.resolve(AudioFormat::Ogg).err().unwrap();
        assert_eq!(err, OrchestratorError::UnsupportedFormat("ogg".to_string()));

        let (adapter, program) = registry.resolve(AudioFormat::Mp3).unwrap();
        assert_eq!(adapter.executable_name(), "lame");
        assert_eq!(program, PathBuf::from("/usr/bin/lame"));
    }

    #[test]
    fn test_format_by_id() {
        let registry = registry();
        assert_eq!(registry.format_by_id("MP3").unwrap(), AudioFormat::Mp3);
        assert!(matches!(
            registry.format_by_id("ogg"),
            Err(OrchestratorError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            registry.format_by_id("wma"),
            Err(OrchestratorError::UnsupportedFormat(_))
        ));
    }
}
