use serde::{Deserialize, Serialize};

pub use crate::encoder::EncoderConfig;
pub use crate::orchestrator::OrchestratorConfig;
pub use crate::process::ProcessConfig;

/// Root configuration.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Tool lookup and version probing.
    #[serde(default)]
    pub encoders: EncoderConfig,
    /// Child process supervision.
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}
