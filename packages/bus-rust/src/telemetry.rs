//! Log subscriber installation for the CLI.

use std::io::{self, IsTerminal};

use tracing::subscriber::SetGlobalDefaultError;
use tracing::Subscriber;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogConfig, LogFormat};

/// Environment variable that overrides the configured log filter.
pub const LOG_ENV: &str = "JSONAPI_OPS_LOG";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    Filter(String),
    #[error("failed to install log subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// The `JSONAPI_OPS_LOG` directive if set, else the configured level.
fn filter(config: &LogConfig, from_env: Option<String>) -> Result<EnvFilter, TelemetryError> {
    let directive = from_env
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.level.clone());
    EnvFilter::try_new(&directive).map_err(|error| TelemetryError::Filter(format!("{directive}: {error}")))
}

/// Installs the global subscriber, writing to stderr.
///
/// # Errors
///
/// Fails on an invalid filter directive or if a subscriber is already
/// installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = filter(config, std::env::var(LOG_ENV).ok())?;

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal());

    let subscriber: Box<dyn Subscriber + Send + Sync> = match config.format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Pretty => Box::new(builder.finish()),
    };

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
