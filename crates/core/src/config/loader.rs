use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment variables that override file settings.
///
/// Sections are separated by a double underscore, as in
/// `AUDIOCONV_PROCESS__TERMINATE_GRACE_MS=500`.
pub const ENV_PREFIX: &str = "AUDIOCONV_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load the default configuration with environment variable overrides.
///
/// Used when no configuration file exists.
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::AudioFormat;
    use figment::Jail;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[process]
terminate_grace_ms = 2000
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.process.terminate_grace_ms, 2000);
        assert_eq!(config.orchestrator.default_format, AudioFormat::Flac);
    }

    #[test]
    fn test_load_config_from_str_empty() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[process]
kill_wait_ms = "soon"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/audioconv.toml"));
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
        assert!(err.is_not_found());
    }

    // Tests that read the environment run inside a Jail, which serializes
    // them and restores the variables afterwards.

    #[test]
    fn test_load_config_from_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "audioconv.toml",
                r#"
[orchestrator]
default_format = "ogg"

[process]
read_buffer_bytes = 1024
"#,
            )?;

            let config = load_config(Path::new("audioconv.toml"))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.orchestrator.default_format, AudioFormat::Ogg);
            assert_eq!(config.process.read_buffer_bytes, 1024);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "audioconv.toml",
                r#"
[encoders]
version_timeout_secs = 3
"#,
            )?;
            jail.set_env("AUDIOCONV_ENCODERS__VERSION_TIMEOUT_SECS", "9");

            let config = load_config(Path::new("audioconv.toml"))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.encoders.version_timeout_secs, 9);
            Ok(())
        });
    }

    #[test]
    fn test_env_overrides_defaults_without_file() {
        Jail::expect_with(|jail| {
            jail.set_env("AUDIOCONV_PROCESS__TERMINATE_GRACE_MS", "250");
            jail.set_env("AUDIOCONV_ORCHESTRATOR__DEFAULT_FORMAT", "opus");

            let config = load_config_from_env().map_err(|e| e.to_string())?;
            assert_eq!(config.process.terminate_grace_ms, 250);
            assert_eq!(config.orchestrator.default_format, AudioFormat::Opus);
            assert_eq!(config.process.kill_wait_ms, 100);
            Ok(())
        });
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        Jail::expect_with(|_| {
            let config = load_config_from_env().map_err(|e| e.to_string())?;
            assert_eq!(config, Config::default());
            Ok(())
        });
    }
}
