//! YAML configuration loading and validation for the load balancer binary

use crate::backend::Backend;
use crate::framer::DEFAULT_MAX_HEADER_BYTES;
use crate::types::LoadBalancerConfig;
use common::LogFormat;
use healthcheck::{CheckType, HealthCheckConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] ValidationErrors),

    #[error(transparent)]
    Backend(#[from] common::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default = "default_backends")]
    pub backends: Vec<String>,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), ValidationErrors> {
        self.server.validate()?;
        self.health.validate()?;
        self.proxy.validate()?;
        self.logging.validate()?;

        if let Err(e) = validate_backends(&self.backends) {
            let mut errors = ValidationErrors::new();
            errors.add("backends", e);
            return Err(errors);
        }
        Ok(())
    }
}

/// Listener settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,
}

/// Health probe settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct HealthSettings {
    /// HTTP path to GET; plain TCP connect when absent
    #[validate(custom = "validate_health_path")]
    pub path: Option<String>,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_check_interval")]
    pub interval: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_probe_timeout")]
    pub timeout: Duration,

    #[validate(range(min = 1, max = 100))]
    pub rise: u32,

    #[validate(range(min = 1, max = 100))]
    pub fall: u32,
}

/// Relay settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ProxySettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_connect_timeout")]
    pub connect_timeout: Duration,

    #[serde(with = "humantime_serde")]
    pub io_timeout: Option<Duration>,

    #[validate(range(min = 256, max = 1048576))]
    pub max_header_bytes: usize,
}

/// Logging settings
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LoggingSettings {
    pub level: Option<String>,

    #[validate(custom = "validate_log_format")]
    pub format: Option<String>,
}

impl LoggingSettings {
    pub fn level(&self) -> &str {
        self.level.as_deref().unwrap_or("info")
    }

    /// Text unless a format was configured.
    pub fn format(&self) -> LogFormat {
        self.format
            .as_deref()
            .and_then(|f| f.parse().ok())
            .unwrap_or_default()
    }
}

// Default implementations

fn default_backends() -> Vec<String> {
    vec![
        "localhost:4001".to_string(),
        "localhost:4002".to_string(),
        "localhost:4003".to_string(),
    ]
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        let defaults = HealthCheckConfig::default();
        Self {
            path: None,
            interval: defaults.interval,
            timeout: defaults.timeout,
            rise: defaults.rise,
            fall: defaults.fall,
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(2),
            io_timeout: None,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            backends: default_backends(),
            health: HealthSettings::default(),
            proxy: ProxySettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

// Custom validators

fn validate_backends(backends: &[String]) -> Result<(), ValidationError> {
    if backends.is_empty() {
        return Err(ValidationError::new("backends_empty"));
    }
    for backend in backends {
        if backend.parse::<Backend>().is_err() {
            let mut err = ValidationError::new("backend_invalid_address");
            err.add_param("value".into(), backend);
            return Err(err);
        }
    }
    Ok(())
}

fn validate_log_format(format: &str) -> Result<(), ValidationError> {
    if format.parse::<LogFormat>().is_err() {
        let mut err = ValidationError::new("log_format_unknown");
        err.add_param("value".into(), &format);
        return Err(err);
    }
    Ok(())
}

fn validate_health_path(path: &str) -> Result<(), ValidationError> {
    if path.trim().is_empty() || path.contains(char::is_whitespace) {
        return Err(ValidationError::new("health_path_invalid"));
    }
    Ok(())
}

fn validate_check_interval(interval: &Duration) -> Result<(), ValidationError> {
    let millis = interval.as_millis();
    if millis < 10 || millis > 3_600_000 {
        return Err(ValidationError::new("check_interval_out_of_range"));
    }
    Ok(())
}

fn validate_probe_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 1 || millis > 60_000 {
        return Err(ValidationError::new("probe_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_connect_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 1 || millis > 60_000 {
        return Err(ValidationError::new("connect_timeout_out_of_range"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from `path`, or from the default search paths.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            tracing::info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => {
                tracing::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(&path)
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/loadbalancer/loadbalancer.yaml")];

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config/loadbalancer/loadbalancer.yaml"));
        }

        paths.push(PathBuf::from("./loadbalancer.yaml"));

        paths.into_iter().find(|p| p.is_file())
    }

    /// Convert to the plain struct the proxy core consumes.
    pub fn to_balancer_config(&self) -> Result<LoadBalancerConfig, ConfigError> {
        let backends = self
            .backends
            .iter()
            .map(|b| b.parse::<Backend>())
            .collect::<Result<Vec<_>, _>>()?;

        let check_type = match &self.health.path {
            Some(path) => CheckType::http_get(path.clone()),
            None => CheckType::Tcp,
        };

        Ok(LoadBalancerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            backends,
            health: HealthCheckConfig {
                timeout: self.health.timeout,
                interval: self.health.interval,
                rise: self.health.rise,
                fall: self.health.fall,
                check_type,
            },
            connect_timeout: self.proxy.connect_timeout,
            io_timeout: self.proxy.io_timeout,
            max_header_bytes: self.proxy.max_header_bytes,
        })
    }
}
