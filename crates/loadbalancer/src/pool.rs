//! Round-robin backend pool partitioned into healthy and unhealthy sets.

use crate::backend::Backend;
use crate::error::ProxyError;
use std::collections::VecDeque;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Shared pool of backends.
///
/// Every operation runs under a single mutex, so callers never observe a
/// backend in both sets or in neither. The lock is never held across I/O.
#[derive(Debug, Default)]
pub struct BackendPool {
    state: Mutex<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    healthy: VecDeque<Backend>,
    unhealthy: VecDeque<Backend>,
}

impl PoolState {
    fn contains(&self, backend: &Backend) -> bool {
        self.healthy.contains(backend) || self.unhealthy.contains(backend)
    }
}

/// Point-in-time copy of pool membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub healthy: Vec<Backend>,
    pub unhealthy: Vec<Backend>,
}

impl PoolSnapshot {
    /// Total number of backends across both sets.
    pub fn len(&self) -> usize {
        self.healthy.len() + self.unhealthy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BackendPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool whose healthy set holds `backends` in order.
    ///
    /// Duplicate addresses keep their first position.
    pub fn with_backends(backends: impl IntoIterator<Item = Backend>) -> Self {
        let mut state = PoolState::default();
        for backend in backends {
            if !state.contains(&backend) {
                state.healthy.push_back(backend);
            }
        }
        Self {
            state: Mutex::new(state),
        }
    }

    /// Append a backend to the healthy set.
    ///
    /// Returns `false` if the address is already known to the pool.
    pub async fn add_backend(&self, backend: Backend) -> bool {
        let mut state = self.state.lock().await;
        if state.contains(&backend) {
            warn!(backend = %backend, "Backend already in pool, ignoring");
            return false;
        }
        info!(backend = %backend, "New backend added");
        state.healthy.push_back(backend);
        true
    }

    /// Pick the next healthy backend in round-robin order.
    ///
    /// The selected backend moves to the tail of the healthy set.
    pub async fn select_next(&self) -> Result<Backend, ProxyError> {
        let mut state = self.state.lock().await;
        let backend = state
            .healthy
            .pop_front()
            .ok_or(ProxyError::NoHealthyBackends)?;
        state.healthy.push_back(backend.clone());
        drop(state);

        debug!(backend = %backend, "Selected backend");
        Ok(backend)
    }

    /// Move `addr` from the healthy set to the tail of the unhealthy set.
    ///
    /// Returns whether a transition happened.
    pub async fn mark_unhealthy(&self, addr: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(pos) = state.healthy.iter().position(|b| b.matches(addr)) else {
            return false;
        };
        if let Some(backend) = state.healthy.remove(pos) {
            state.unhealthy.push_back(backend);
        }
        true
    }

    /// Move `addr` from the unhealthy set to the tail of the healthy set.
    ///
    /// Returns whether a transition happened.
    pub async fn mark_healthy(&self, addr: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(pos) = state.unhealthy.iter().position(|b| b.matches(addr)) else {
            return false;
        };
        if let Some(backend) = state.unhealthy.remove(pos) {
            state.healthy.push_back(backend);
        }
        true
    }

    /// Copy both sets as they are right now.
    pub async fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock().await;
        PoolSnapshot {
            healthy: state.healthy.iter().cloned().collect(),
            unhealthy: state.unhealthy.iter().cloned().collect(),
        }
    }

    pub async fn healthy_count(&self) -> usize {
        self.state.lock().await.healthy.len()
    }

    /// Number of backends across both sets.
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.healthy.len() + state.unhealthy.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
