//! Runtime configuration consumed by the proxy core.

use crate::backend::Backend;
use crate::framer::DEFAULT_MAX_HEADER_BYTES;
use healthcheck::HealthCheckConfig;
use std::time::Duration;

/// Load balancer configuration
#[derive(Debug, Clone)]
pub struct LoadBalancerConfig {
    /// Address to bind the listener on
    pub host: String,

    /// Listening port (0 picks an ephemeral port)
    pub port: u16,

    /// Backends in round-robin order
    pub backends: Vec<Backend>,

    /// Health probe settings
    pub health: HealthCheckConfig,

    /// Timeout for dialing a backend
    pub connect_timeout: Duration,

    /// Deadline for each read/write phase of a relay; `None` disables it
    pub io_timeout: Option<Duration>,

    /// Upper bound for a message's start line and header section
    pub max_header_bytes: usize,
}

impl LoadBalancerConfig {
    /// `host:port` the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            backends: Vec::new(),
            health: HealthCheckConfig::default(),
            connect_timeout: Duration::from_secs(2),
            io_timeout: None,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}
