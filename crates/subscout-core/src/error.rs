//! Unified error types for Subscout Core.

use subscout_types::ConfigError;
use thiserror::Error;

/// Main error type for all Subscout operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AppError {
    /// Network request failed (HTTP client).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// File system I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Results could not be persisted (fatal for a run).
    #[error("Output error: {path}: {message}")]
    Output {
        /// Destination that could not be written
        path: String,
        /// Underlying failure
        message: String,
    },

    /// The tracing subscriber could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl AppError {
    /// Wrap a persistence failure at `path`.
    pub fn output(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        AppError::Output { path: path.display().to_string(), message: err.to_string() }
    }
}

/// Result type alias for Subscout operations.
pub type AppResult<T> = Result<T, AppError>;
