//! Error types for the camera thing

use thiserror::Error;

/// Main error type for the camera thing
#[derive(Error, Debug)]
pub enum ThingError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The camera could not be opened or configured at startup. Fatal.
    #[error("Device open failed: {0}")]
    DeviceOpenFailed(String),

    /// A single capture attempt failed. Recoverable, scoped to one iteration.
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    /// A parameter write was refused. Stored state is unchanged.
    #[error("Parameter rejected: {0}")]
    ParameterRejected(String),

    /// The capture loop did not stop within the shutdown bound.
    #[error("Capture loop did not stop within {0:?}")]
    CancellationTimeout(std::time::Duration),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for ThingError {
    fn from(err: tokio::task::JoinError) -> Self {
        ThingError::Internal(err.to_string())
    }
}
