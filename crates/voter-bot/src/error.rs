//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] voter_feed::FeedError),

    #[error("Chain error: {0}")]
    Chain(#[from] voter_chain::ChainError),

    #[error("Registry error: {0}")]
    Registry(#[from] voter_registry::RegistryError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] voter_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
