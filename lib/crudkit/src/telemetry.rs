//! Tracing setup.

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};

/// A global subscriber was already installed.
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(String);

/// Install a fmt subscriber filtered by `config.level`.
///
/// An unparseable level falls back to `info`. Calling this twice in one
/// process returns an error rather than replacing the first subscriber.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
    installed.map_err(|e| TelemetryError(e.to_string()))?;

    tracing::info!(level = %config.level, "tracing initialized");
    Ok(())
}

pub fn shutdown_tracing() {
    tracing::info!("tracing shutdown");
}
