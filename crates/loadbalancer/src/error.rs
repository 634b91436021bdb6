//! Error types for the proxy core.

use crate::framer::FrameError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while binding the listener or relaying one connection.
///
/// Only [`ProxyError::Bind`] is fatal; every other variant is scoped to a
/// single client connection.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("no healthy backends available")]
    NoHealthyBackends,

    #[error("failed to connect to backend {backend}: {source}")]
    Dial {
        backend: String,
        #[source]
        source: io::Error,
    },

    #[error("framing error: {0}")]
    Framing(#[from] FrameError),

    #[error("{phase} timed out after {timeout:?}")]
    Timeout { phase: &'static str, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ProxyError {
    /// Whether the client should be told the service is unavailable.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ProxyError::NoHealthyBackends | ProxyError::Dial { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_classification() {
        assert!(ProxyError::NoHealthyBackends.is_unavailable());
        assert!(
            ProxyError::Dial {
                backend: "localhost:4001".to_string(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            }
            .is_unavailable()
        );
        assert!(
            !ProxyError::Timeout {
                phase: "read request",
                timeout: Duration::from_secs(1),
            }
            .is_unavailable()
        );
        assert!(!ProxyError::Io(io::Error::from(io::ErrorKind::BrokenPipe)).is_unavailable());
    }

    #[test]
    fn test_error_display() {
        let err = ProxyError::Bind {
            addr: "0.0.0.0:4000".to_string(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to bind 0.0.0.0:4000"));
        assert_eq!(
            ProxyError::NoHealthyBackends.to_string(),
            "no healthy backends available"
        );
    }
}
