//! Minimal HTTP-aware TCP load balancer.
//!
//! Each client connection carries exactly one HTTP/1.x request and one
//! response. The balancer frames both messages, relays them byte-for-byte
//! to a backend picked round robin from the healthy set, and closes both
//! sockets.
//!
//! # Components
//!
//! - **Framer**: reads one complete HTTP message from a byte stream
//! - **Pool**: healthy/unhealthy backend sets with round-robin selection
//! - **Health**: periodic probes that migrate backends between sets
//! - **Handler**: per-connection relay state machine
//! - **Server**: accept loop spawning a task per connection

pub mod backend;
pub mod config;
pub mod error;
pub mod framer;
pub mod handler;
pub mod health;
pub mod pool;
pub mod server;
pub mod types;

pub use backend::Backend;
pub use config::{Config, ConfigError};
pub use error::ProxyError;
pub use framer::{FrameError, FrameErrorKind, Headers, HttpMessage, MessageFramer};
pub use handler::{ConnectionHandler, SessionState};
pub use health::{CycleReport, HealthMonitor};
pub use pool::{BackendPool, PoolSnapshot};
pub use server::LoadBalancer;
pub use types::LoadBalancerConfig;
