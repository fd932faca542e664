//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Holding {0} not found on page {1}")]
    HoldingNotFound(String, u32),

    #[error(transparent)]
    Action(#[from] vault_action::ActionError),

    #[error("Source error: {0}")]
    Source(#[from] vault_source::SourceError),

    #[error("Gate error: {0}")]
    Gate(#[from] vault_gate::GateError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] vault_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Load superseded")]
    Superseded,
}

pub type AppResult<T> = Result<T, AppError>;
