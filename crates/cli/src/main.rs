mod cli;
mod commands;
mod metrics;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audioconv_core::{
    build_orchestrator, load_config, load_config_from_env, validate_config, Config,
};

use cli::{Cli, Commands};

/// Config file picked up from the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "audioconv.toml";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref())?;
    validate_config(&config).context("Configuration validation failed")?;

    let orchestrator = build_orchestrator(&config).await;

    let result = match &cli.command {
        Commands::Codecs(args) => commands::codecs(&orchestrator, args),
        Commands::Convert(args) => commands::convert(&orchestrator, args).await,
        Commands::Batch(args) => commands::batch(&orchestrator, args).await,
    };

    if cli.metrics {
        print!("{}", metrics::encode_metrics()?);
    }

    result
}

/// Loads the given config file, or the default one when present.
///
/// Without a file, defaults apply with `AUDIOCONV_*` environment overrides.
fn load_configuration(path: Option<&Path>) -> Result<Config> {
    if let Some(path) = path {
        info!("Loading configuration from {:?}", path);
        return load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    match load_config(&default_path) {
        Ok(config) => {
            info!("Loaded configuration from {:?}", default_path);
            Ok(config)
        }
        Err(e) if e.is_not_found() => load_config_from_env()
            .context("Failed to load config from environment"),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to load config from {:?}", default_path))
        }
    }
}
