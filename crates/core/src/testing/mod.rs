//! Testing utilities for process lifecycle tests.
//!
//! [`MockAdapter`] stands in for a real encoder by running `/bin/sh` with a
//! script, so the orchestrator and runner can be exercised end to end on
//! any Unix host without flac, lame, oggenc or opusenc installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use audioconv_core::testing::{fixtures, MockAdapter};
//!
//! let adapter = MockAdapter::new(AudioFormat::Mp3, fixtures::PROGRESS_THEN_COPY);
//! let orchestrator = fixtures::orchestrator(vec![adapter.clone()]).await;
//!
//! let mut events = orchestrator.subscribe().await;
//! orchestrator.convert(request).await?;
//! ```

mod mock_adapter;

pub use mock_adapter::{MockAdapter, MOCK_VERSION};

/// Scripts and helpers for building test setups.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use super::MockAdapter;
    use crate::encoder::EncoderAdapter;
    use crate::orchestrator::{AdapterRegistry, ConversionOrchestrator, OrchestratorConfig};
    use crate::process::ProcessConfig;

    /// Copies the input to the output.
    pub const COPY_INPUT: &str = r#"cp "$1" "$2""#;

    /// Reports 45% the way LAME does, then copies.
    pub const PROGRESS_THEN_COPY: &str = r#"printf '( 45%%)\r' >&2; cp "$1" "$2""#;

    /// Writes a partial output, then waits forever ignoring SIGTERM.
    ///
    /// The ignored signal survives `exec`, so only a kill stops it.
    pub const IGNORE_TERM: &str = r#"trap '' TERM; printf partial > "$2"; exec sleep 30"#;

    /// Writes a partial output, then sleeps until terminated.
    pub const SLOW: &str = r#"printf partial > "$2"; exec sleep 30"#;

    /// Fails inputs whose name contains `needle` and copies the rest.
    pub fn fail_when_input_contains(needle: &str) -> String {
        format!(
            r#"case "$1" in *{}*) echo "cannot encode $1" >&2; exit 1;; esac; cp "$1" "$2""#,
            needle
        )
    }

    /// Prints `message` to stderr and exits with `code`.
    pub fn fail(code: i32, message: &str) -> String {
        format!("echo '{}' >&2; exit {}", message, code)
    }

    /// Creates a small placeholder input file in `dir`.
    pub fn write_input(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"RIFF....WAVEfmt ").unwrap_or_else(|e| {
            panic!("failed to write test input {}: {}", path.display(), e)
        });
        path
    }

    /// Builds an orchestrator around the given mocks.
    pub async fn orchestrator(adapters: Vec<MockAdapter>) -> ConversionOrchestrator {
        let adapters = adapters
            .into_iter()
            .map(|a| Arc::new(a) as Arc<dyn EncoderAdapter>)
            .collect();
        ConversionOrchestrator::new(
            AdapterRegistry::probe(adapters).await,
            OrchestratorConfig::default(),
            ProcessConfig::default(),
        )
    }
}
