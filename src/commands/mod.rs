//! CLI subcommands.

pub mod cleanup;
pub mod serve;

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

use crate::config::{Config, LogFormat};

/// Initialize stdout logging. `RUST_LOG` overrides the default `info` level.
pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Load and validate the configuration, then start logging.
///
/// A missing file falls back to defaults. Warnings are logged once the
/// subscriber is up.
pub fn load_config(path: &Path) -> Result<Config> {
    let (config, found) = Config::load_or_default(path)?;
    let report = config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;

    init_tracing(config.log_format);

    if !found {
        warn!(path = %path.display(), "Config file not found, using defaults");
    }
    for warning in &report.warnings {
        warn!("Config: {warning}");
    }
    Ok(config)
}
