//! Error type for the CLI runtime.

use thiserror::Error;
use trellis_config::ConfigError;
use trellis_plugins::SelectionError;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(#[from] ConfigError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to select plugins: {0}")]
    Selection(#[from] SelectionError),
    #[error("failed to serialise output: {0}")]
    Serialise(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Write(#[from] std::io::Error),
}
