//! Health check implementations.

use crate::types::{CheckType, HealthCheckConfig, HealthCheckResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Health checker trait
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Perform a health check
    async fn check(&self) -> HealthCheckResult;

    /// Get the name of this checker
    fn name(&self) -> &str;
}

/// Build the checker described by `config` for one backend address (`host:port`).
pub fn build_checker(
    target: &str,
    config: &HealthCheckConfig,
) -> common::Result<Arc<dyn HealthChecker>> {
    match &config.check_type {
        CheckType::Tcp => Ok(Arc::new(TcpChecker::new(target, config.timeout))),
        CheckType::Http {
            method,
            path,
            expected_codes,
        } => {
            let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
                .map_err(|e| common::Error::healthcheck(format!("invalid method {method}: {e}")))?;
            let path = if path.starts_with('/') {
                path.clone()
            } else {
                format!("/{path}")
            };
            let checker = HttpChecker::new(
                format!("http://{target}{path}"),
                method,
                expected_codes.clone(),
                config.timeout,
            )?;
            Ok(Arc::new(checker))
        }
    }
}

/// TCP health checker
pub struct TcpChecker {
    target: String,
    timeout_duration: Duration,
}

impl TcpChecker {
    /// Create a new TCP health checker
    pub fn new(target: impl Into<String>, timeout_duration: Duration) -> Self {
        Self {
            target: target.into(),
            timeout_duration,
        }
    }
}

#[async_trait]
impl HealthChecker for TcpChecker {
    async fn check(&self) -> HealthCheckResult {
        let start = Instant::now();

        match timeout(self.timeout_duration, TcpStream::connect(self.target.as_str())).await {
            Ok(Ok(_stream)) => {
                let duration = start.elapsed();
                debug!(target = %self.target, duration_ms = duration.as_millis(), "TCP check successful");
                HealthCheckResult::healthy(duration)
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                debug!(target = %self.target, error = %e, "TCP check failed");
                HealthCheckResult::error(duration, format!("Connection failed: {}", e))
            }
            Err(_) => {
                let duration = start.elapsed();
                debug!(target = %self.target, "TCP check timed out");
                HealthCheckResult::timeout(duration)
            }
        }
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

/// HTTP health checker
pub struct HttpChecker {
    url: String,
    method: reqwest::Method,
    expected_codes: Vec<u16>,
    timeout_duration: Duration,
    client: reqwest::Client,
}

impl HttpChecker {
    /// Create a new HTTP health checker
    pub fn new(
        url: String,
        method: reqwest::Method,
        expected_codes: Vec<u16>,
        timeout_duration: Duration,
    ) -> common::Result<Self> {
        // Every probe opens a fresh connection so a dead backend is never
        // masked by a pooled socket.
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
            .map_err(common::Error::healthcheck)?;

        Ok(Self {
            url,
            method,
            expected_codes,
            timeout_duration,
            client,
        })
    }

    /// URL probed by this checker
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl HealthChecker for HttpChecker {
    async fn check(&self) -> HealthCheckResult {
        let start = Instant::now();

        let request = self.client.request(self.method.clone(), &self.url);

        match timeout(self.timeout_duration, request.send()).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                let status_code = response.status().as_u16();

                if self.expected_codes.is_empty() || self.expected_codes.contains(&status_code) {
                    debug!(url = %self.url, status = status_code, duration_ms = duration.as_millis(),
                           "HTTP check successful");
                    HealthCheckResult::healthy(duration).with_response_code(status_code)
                } else {
                    warn!(url = %self.url, status = status_code, "HTTP check failed: unexpected status code");
                    HealthCheckResult::unhealthy(
                        duration,
                        format!("Unexpected status code: {}", status_code),
                    )
                    .with_response_code(status_code)
                }
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                debug!(url = %self.url, error = %e, "HTTP check failed");
                HealthCheckResult::error(duration, format!("HTTP request failed: {}", e))
            }
            Err(_) => {
                let duration = start.elapsed();
                debug!(url = %self.url, "HTTP check timed out");
                HealthCheckResult::timeout(duration)
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthStatus;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve every connection with a fixed status line until the test ends.
    async fn spawn_http_backend(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut seen = Vec::new();
                    while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                        match stream.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => seen.extend_from_slice(&buf[..n]),
                        }
                    }
                    let response = format!(
                        "{status_line}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });

        addr
    }

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_tcp_checker_healthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let checker = TcpChecker::new(addr, Duration::from_secs(1));
        let result = checker.check().await;
        assert!(result.is_healthy());
        assert_eq!(checker.name(), "tcp");
    }

    #[tokio::test]
    async fn test_tcp_checker_refused() {
        let checker = TcpChecker::new(closed_port().await, Duration::from_millis(500));

        let result = checker.check().await;
        assert!(!result.is_healthy());
        assert!(matches!(result.status, HealthStatus::Error | HealthStatus::Timeout));
    }

    #[tokio::test]
    async fn test_http_checker_expected_status() {
        let addr = spawn_http_backend("HTTP/1.1 200 OK").await;
        let checker = HttpChecker::new(
            format!("http://{addr}/health"),
            reqwest::Method::GET,
            vec![200],
            Duration::from_secs(2),
        )
        .unwrap();

        let result = checker.check().await;
        assert!(result.is_healthy(), "unexpected result: {result:?}");
        assert_eq!(result.response_code, Some(200));
    }

    #[tokio::test]
    async fn test_http_checker_unexpected_status() {
        let addr = spawn_http_backend("HTTP/1.1 503 Service Unavailable").await;
        let checker = HttpChecker::new(
            format!("http://{addr}/health"),
            reqwest::Method::GET,
            vec![200],
            Duration::from_secs(2),
        )
        .unwrap();

        let result = checker.check().await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert_eq!(result.response_code, Some(503));
    }

    #[tokio::test]
    async fn test_http_checker_connection_error() {
        let addr = closed_port().await;
        let checker = HttpChecker::new(
            format!("http://{addr}/health"),
            reqwest::Method::GET,
            vec![200],
            Duration::from_millis(500),
        )
        .unwrap();

        let result = checker.check().await;
        assert!(!result.is_healthy());
    }

    #[tokio::test]
    async fn test_build_checker_by_type() {
        let tcp = build_checker("127.0.0.1:4001", &HealthCheckConfig::default()).unwrap();
        assert_eq!(tcp.name(), "tcp");

        let config = HealthCheckConfig {
            check_type: CheckType::http_get("health"),
            ..HealthCheckConfig::default()
        };
        let http = build_checker("127.0.0.1:4001", &config).unwrap();
        assert_eq!(http.name(), "http");
    }

    #[test]
    fn test_build_checker_rejects_bad_method() {
        let config = HealthCheckConfig {
            check_type: CheckType::Http {
                method: "GE T".to_string(),
                path: "/".to_string(),
                expected_codes: vec![200],
            },
            ..HealthCheckConfig::default()
        };
        assert!(build_checker("127.0.0.1:4001", &config).is_err());
    }
}
