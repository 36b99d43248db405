//! Logging setup.
//!
//! `RUST_LOG` wins over the level passed by the caller.

use tracing_subscriber::EnvFilter;

use crate::error::{AppError, AppResult};

/// Install the global tracing subscriber. Call once, from the binary.
pub fn init_logging(level: &str) -> AppResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| AppError::Logging(format!("invalid log filter '{}': {}", level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AppError::Logging(format!("logger already initialised: {}", e)))
}
