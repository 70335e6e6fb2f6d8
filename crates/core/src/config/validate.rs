use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Termination grace period is not 0
/// - Read buffer size is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.process.terminate_grace_ms == 0 {
        return Err(ConfigError::ValidationError(
            "process.terminate_grace_ms cannot be 0".to_string(),
        ));
    }

    if config.process.read_buffer_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "process.read_buffer_bytes cannot be 0".to_string(),
        ));
    }

    Ok(())
}
