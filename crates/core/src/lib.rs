pub mod config;
pub mod encoder;
pub mod metrics;
pub mod orchestrator;
pub mod process;
pub mod testing;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config, ConfigError,
};
pub use encoder::{
    default_adapters, AdapterInfo, AudioFormat, ChannelMode, ConversionOptions, ConversionRequest,
    EncoderAdapter, EncoderConfig, ExecutionPlan, QualityPreset, QualitySetting,
};
pub use orchestrator::{
    AdapterRegistry, BatchRequest, BatchSummary, ConversionEvent, ConversionOrchestrator,
    ConversionResult, ConversionState, JobId, JobOutcome, OrchestratorConfig, OrchestratorError,
    OutputLocation,
};
pub use process::{ProcessConfig, ProcessError, ProcessEvent, ProcessHandle, ProcessRunner};

/// Probes the default adapters and builds an orchestrator from `config`.
pub async fn build_orchestrator(config: &Config) -> ConversionOrchestrator {
    let registry = AdapterRegistry::probe(default_adapters(&config.encoders)).await;
    ConversionOrchestrator::new(
        registry,
        config.orchestrator.clone(),
        config.process.clone(),
    )
}
