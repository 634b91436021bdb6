//! Background health checking of the backend pool.
//!
//! Every cycle takes a fresh membership snapshot, probes all backends
//! concurrently outside the pool lock, then applies rise/fall transitions
//! through the pool's public operations.

use crate::pool::BackendPool;
use futures::future::join_all;
use healthcheck::{
    HealthCheckConfig, HealthCheckResult, HealthCheckStats, HealthChecker, build_checker,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

/// Shortest cadence the monitor will run at.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Transitions applied by one probe cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Number of backends probed
    pub probed: usize,
    /// Addresses moved from healthy to unhealthy
    pub marked_unhealthy: Vec<String>,
    /// Addresses moved from unhealthy to healthy
    pub marked_healthy: Vec<String>,
}

/// Health monitor for a backend pool
pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    config: HealthCheckConfig,
    checkers: HashMap<String, Arc<dyn HealthChecker>>,
    stats: HashMap<String, HealthCheckStats>,
    stop_signal: Arc<Notify>,
}

impl HealthMonitor {
    /// Create a monitor; checkers are built from `config` on first use.
    pub fn new(pool: Arc<BackendPool>, config: HealthCheckConfig) -> Self {
        Self::with_checkers(pool, config, HashMap::new())
    }

    /// Create a monitor with pre-built checkers keyed by backend address.
    ///
    /// Backends without an entry get a checker built from `config`.
    pub fn with_checkers(
        pool: Arc<BackendPool>,
        config: HealthCheckConfig,
        checkers: HashMap<String, Arc<dyn HealthChecker>>,
    ) -> Self {
        Self {
            pool,
            config,
            checkers,
            stats: HashMap::new(),
            stop_signal: Arc::new(Notify::new()),
        }
    }

    /// Handle that stops [`HealthMonitor::run`] when notified.
    pub fn stop_handle(&self) -> Arc<Notify> {
        self.stop_signal.clone()
    }

    /// Probe statistics for one backend address.
    pub fn stats(&self, addr: &str) -> Option<&HealthCheckStats> {
        self.stats.get(addr)
    }

    /// Run probe cycles at the configured interval until stopped.
    pub async fn run(mut self) {
        let period = self.config.interval.max(MIN_CHECK_INTERVAL);
        let mut check_interval = interval(period);
        check_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let stop_signal = self.stop_signal.clone();

        info!(
            interval_ms = period.as_millis(),
            rise = self.config.rise,
            fall = self.config.fall,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                biased;
                _ = stop_signal.notified() => {
                    info!("Health monitor stopping");
                    break;
                }
                _ = check_interval.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// Probe every backend once and apply the resulting transitions.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let snapshot = self.pool.snapshot().await;

        let members: Vec<(String, bool)> = snapshot
            .healthy
            .iter()
            .map(|b| (b.address(), true))
            .chain(snapshot.unhealthy.iter().map(|b| (b.address(), false)))
            .collect();

        let probes = members.into_iter().filter_map(|(addr, was_healthy)| {
            let checker = self.checker_for(&addr)?;
            Some(async move {
                let result = checker.check().await;
                (addr, was_healthy, result)
            })
        });
        let results = join_all(probes.collect::<Vec<_>>()).await;

        let mut report = CycleReport {
            probed: results.len(),
            ..CycleReport::default()
        };
        for (addr, was_healthy, result) in results {
            self.apply(addr, was_healthy, &result, &mut report).await;
        }

        debug!(
            probed = report.probed,
            marked_unhealthy = report.marked_unhealthy.len(),
            marked_healthy = report.marked_healthy.len(),
            "Health check cycle complete"
        );
        report
    }

    fn checker_for(&mut self, addr: &str) -> Option<Arc<dyn HealthChecker>> {
        if let Some(checker) = self.checkers.get(addr) {
            return Some(checker.clone());
        }
        match build_checker(addr, &self.config) {
            Ok(checker) => {
                self.checkers.insert(addr.to_string(), checker.clone());
                Some(checker)
            }
            Err(e) => {
                warn!(backend = %addr, error = %e, "Failed to build health checker");
                None
            }
        }
    }

    async fn apply(
        &mut self,
        addr: String,
        was_healthy: bool,
        result: &HealthCheckResult,
        report: &mut CycleReport,
    ) {
        let stats = self.stats.entry(addr.clone()).or_default();
        stats.update(result);
        let successes = stats.consecutive_successes;
        let failures = stats.consecutive_failures;
        let total_checks = stats.total_checks;
        let avg_ms = stats.avg_response_time_ms;

        if was_healthy && !result.is_healthy() {
            if failures < self.config.fall.max(1) {
                debug!(
                    backend = %addr,
                    consecutive = failures,
                    "Health check failed, below fall threshold"
                );
                return;
            }
            if self.pool.mark_unhealthy(&addr).await {
                warn!(
                    backend = %addr,
                    status = %result.status,
                    message = result.message.as_deref().unwrap_or("unknown"),
                    consecutive = failures,
                    total_checks,
                    avg_ms,
                    "Backend is now UNHEALTHY"
                );
                report.marked_unhealthy.push(addr);
            }
        } else if !was_healthy && result.is_healthy() {
            if successes < self.config.rise.max(1) {
                debug!(
                    backend = %addr,
                    consecutive = successes,
                    "Health check passed, below rise threshold"
                );
                return;
            }
            if self.pool.mark_healthy(&addr).await {
                info!(
                    backend = %addr,
                    duration_ms = result.duration.as_millis(),
                    consecutive = successes,
                    total_checks,
                    avg_ms,
                    "Backend is now HEALTHY"
                );
                report.marked_healthy.push(addr);
            }
        }
    }
}
