//! # Structured Logging
//!
//! Installs the global `tracing` subscriber: an `EnvFilter` (honouring
//! `RUST_LOG`, falling back to the configured level) and a JSON or plain text
//! formatting layer.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::error::{ClientError, ClientResult};
use crate::observability::config::{LogConfig, LogFormat};

/// Build the filter from `RUST_LOG`, or from the configured level
pub fn build_filter(config: &LogConfig) -> ClientResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| ClientError::config(format!("Invalid log level {:?}: {}", config.level, e))),
    }
}

/// Initialize the global subscriber; fails if one is already installed
pub fn init_logging(config: &LogConfig) -> ClientResult<()> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init(),
    };

    result.map_err(|e| ClientError::config(format!("Failed to initialize logging: {}", e)))
}
