//! Tool discovery and version probing.

use regex_lite::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::config::EncoderConfig;
use super::types::{AdapterInfo, AudioFormat};

/// Finds `name` in the configured directories, then on `PATH`.
pub fn locate(name: &str, config: &EncoderConfig) -> Option<PathBuf> {
    for dir in &config.search_paths {
        if let Ok(path) = which::which_in(name, Some(dir), dir) {
            return Some(path);
        }
    }
    which::which(name).ok()
}

/// Extracts the first capture group of `pattern` from a version banner.
pub fn parse_version(pattern: &Regex, banner: &str) -> Option<String> {
    pattern
        .captures(banner)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Runs `<tool> --version` and matches the banner on stdout and stderr.
async fn read_version(path: &Path, pattern: &Regex, timeout_secs: u64) -> String {
    let output = timeout(
        Duration::from_secs(timeout_secs),
        Command::new(path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    let output = match output {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!("Failed to run {} --version: {}", path.display(), e);
            return AdapterInfo::UNKNOWN_VERSION.to_string();
        }
        Err(_) => {
            warn!(
                "{} --version did not answer within {}s",
                path.display(),
                timeout_secs
            );
            return AdapterInfo::UNKNOWN_VERSION.to_string();
        }
    };

    // Tools disagree on which stream the banner goes to.
    let mut banner = String::from_utf8_lossy(&output.stdout).into_owned();
    banner.push('\n');
    banner.push_str(&String::from_utf8_lossy(&output.stderr));

    parse_version(pattern, &banner).unwrap_or_else(|| AdapterInfo::UNKNOWN_VERSION.to_string())
}

/// Locates a tool and reads its version.
pub async fn probe_tool(
    format: AudioFormat,
    name: &str,
    version_pattern: &Regex,
    config: &EncoderConfig,
) -> AdapterInfo {
    let Some(path) = locate(name, config) else {
        warn!("{} encoder ({}) not found in PATH", format, name);
        return AdapterInfo::unavailable(format);
    };

    let version = read_version(&path, version_pattern, config.version_timeout_secs).await;
    debug!("Found {} at {} (version {})", name, path.display(), version);
    AdapterInfo::available(format, path, version)
}
