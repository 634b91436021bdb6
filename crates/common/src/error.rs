//! Common error types for the load balancer crates.

use std::fmt;

/// A specialized Result type for load balancer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for load balancer operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Healthcheck error: {0}")]
    Healthcheck(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid backend address: {0}")]
    Backend(String),
}

impl Error {
    /// Create a new healthcheck error.
    pub fn healthcheck(msg: impl fmt::Display) -> Self {
        Error::Healthcheck(msg.to_string())
    }

    /// Create a new configuration error.
    pub fn config(msg: impl fmt::Display) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new backend address error.
    pub fn backend(msg: impl fmt::Display) -> Self {
        Error::Backend(msg.to_string())
    }
}
