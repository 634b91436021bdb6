//! Health check types and structures.

use std::fmt;
use std::time::Duration;

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend answered the probe as expected
    Healthy,
    /// Backend answered, but not as expected
    Unhealthy,
    /// Probe did not complete within its timeout
    Timeout,
    /// Probe could not be performed (connection refused, protocol error, ...)
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
            HealthStatus::Timeout => write!(f, "TIMEOUT"),
            HealthStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Status of the health check
    pub status: HealthStatus,

    /// Duration of the health check
    pub duration: Duration,

    /// Optional error message
    pub message: Option<String>,

    /// Response code (for HTTP checks)
    pub response_code: Option<u16>,
}

impl HealthCheckResult {
    /// Create a healthy result
    pub fn healthy(duration: Duration) -> Self {
        Self {
            status: HealthStatus::Healthy,
            duration,
            message: None,
            response_code: None,
        }
    }

    /// Create an unhealthy result
    pub fn unhealthy(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            duration,
            message: Some(message.into()),
            response_code: None,
        }
    }

    /// Create a timeout result
    pub fn timeout(duration: Duration) -> Self {
        Self {
            status: HealthStatus::Timeout,
            duration,
            message: Some("Health check timed out".to_string()),
            response_code: None,
        }
    }

    /// Create an error result
    pub fn error(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            duration,
            message: Some(message.into()),
            response_code: None,
        }
    }

    /// Attach the HTTP status code the backend answered with
    pub fn with_response_code(mut self, code: u16) -> Self {
        self.response_code = Some(code);
        self
    }

    /// Check if the result is healthy
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Health check configuration shared by every backend of a pool
#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheckConfig {
    /// Timeout for a single probe
    pub timeout: Duration,

    /// Interval between probe cycles
    pub interval: Duration,

    /// Number of consecutive successes required to become healthy
    pub rise: u32,

    /// Number of consecutive failures required to become unhealthy
    pub fall: u32,

    /// Check type
    pub check_type: CheckType,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            interval: Duration::from_secs(1),
            rise: 1,
            fall: 1,
            check_type: CheckType::Tcp,
        }
    }
}

/// Health check type
#[derive(Debug, Clone, PartialEq)]
pub enum CheckType {
    /// TCP connect-and-close
    Tcp,

    /// HTTP request against the backend itself
    Http {
        /// HTTP method (GET, HEAD, ...)
        method: String,
        /// Request path
        path: String,
        /// Expected status codes
        expected_codes: Vec<u16>,
    },
}

impl CheckType {
    /// HTTP GET to `path` expecting a 200.
    pub fn http_get(path: impl Into<String>) -> Self {
        CheckType::Http {
            method: "GET".to_string(),
            path: path.into(),
            expected_codes: vec![200],
        }
    }
}

/// Health check statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCheckStats {
    /// Total checks performed
    pub total_checks: u64,

    /// Successful checks
    pub successful_checks: u64,

    /// Failed checks
    pub failed_checks: u64,

    /// Timeout count
    pub timeouts: u64,

    /// Average response time (milliseconds)
    pub avg_response_time_ms: f64,

    /// Current consecutive successes
    pub consecutive_successes: u32,

    /// Current consecutive failures
    pub consecutive_failures: u32,
}

impl HealthCheckStats {
    /// Update stats with a check result
    pub fn update(&mut self, result: &HealthCheckResult) {
        self.total_checks += 1;

        match result.status {
            HealthStatus::Healthy => {
                self.successful_checks += 1;
                self.consecutive_successes = self.consecutive_successes.saturating_add(1);
                self.consecutive_failures = 0;
            }
            HealthStatus::Unhealthy | HealthStatus::Error => {
                self.failed_checks += 1;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.consecutive_successes = 0;
            }
            HealthStatus::Timeout => {
                self.timeouts += 1;
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.consecutive_successes = 0;
            }
        }

        // Running mean over all checks
        let duration_ms = result.duration.as_millis() as f64;
        self.avg_response_time_ms = (self.avg_response_time_ms * (self.total_checks - 1) as f64
            + duration_ms)
            / self.total_checks as f64;
    }
}
