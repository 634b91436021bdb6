//! Backend liveness probes for the load balancer.
//!
//! This crate provides the probe side of health checking:
//! - TCP connect-and-close checks
//! - HTTP checks against a configured path (GET expecting 200 by default)
//!
//! Deciding what a probe result means for a backend pool (rise/fall
//! thresholds, migrating backends between sets) is left to the caller;
//! [`HealthCheckStats`] carries the consecutive counters it needs.
//!
//! # Example
//!
//! ```no_run
//! use healthcheck::{HealthCheckConfig, checkers::build_checker, types::CheckType};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HealthCheckConfig {
//!     check_type: CheckType::http_get("/health"),
//!     ..HealthCheckConfig::default()
//! };
//!
//! let checker = build_checker("localhost:4001", &config)?;
//! let result = checker.check().await;
//! println!("{} in {:?}", result.status, result.duration);
//! # Ok(())
//! # }
//! ```

pub mod checkers;
pub mod types;

pub use checkers::{HealthChecker, HttpChecker, TcpChecker, build_checker};
pub use types::{CheckType, HealthCheckConfig, HealthCheckResult, HealthCheckStats, HealthStatus};

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "HEALTHY");
        assert_eq!(HealthStatus::Unhealthy.to_string(), "UNHEALTHY");
        assert_eq!(HealthStatus::Timeout.to_string(), "TIMEOUT");
        assert_eq!(HealthStatus::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_health_check_result() {
        let result = HealthCheckResult::healthy(Duration::from_millis(100));
        assert!(result.is_healthy());
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(result.message.is_none());
    }

    #[test]
    fn test_stats_update() {
        let mut stats = HealthCheckStats::default();

        let result = HealthCheckResult::healthy(Duration::from_millis(100));
        stats.update(&result);

        assert_eq!(stats.total_checks, 1);
        assert_eq!(stats.successful_checks, 1);
        assert_eq!(stats.consecutive_successes, 1);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[test]
    fn test_stats_failure_resets_successes() {
        let mut stats = HealthCheckStats::default();
        stats.update(&HealthCheckResult::healthy(Duration::from_millis(10)));
        stats.update(&HealthCheckResult::healthy(Duration::from_millis(30)));
        stats.update(&HealthCheckResult::timeout(Duration::from_millis(20)));

        assert_eq!(stats.total_checks, 3);
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.consecutive_successes, 0);
        assert_eq!(stats.consecutive_failures, 1);
        assert!((stats.avg_response_time_ms - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_config_is_single_probe() {
        let config = HealthCheckConfig::default();
        assert_eq!(config.rise, 1);
        assert_eq!(config.fall, 1);
        assert_eq!(config.interval, Duration::from_secs(1));
        assert_eq!(config.check_type, CheckType::Tcp);
    }
}
