//! Upstream backend addresses.

use std::fmt;
use std::str::FromStr;

/// An upstream server, identified by its `host:port` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Backend {
    host: String,
    port: u16,
}

impl Backend {
    /// Create a backend from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the backend's identity and dial target.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether `addr` names this backend.
    pub fn matches(&self, addr: &str) -> bool {
        addr.rsplit_once(':')
            .is_some_and(|(host, port)| {
                host == self.host && port.parse::<u16>().ok() == Some(self.port)
            })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for Backend {
    type Err = common::Error;

    /// Parses `host:port`, tolerating an `http://` prefix and a trailing `/`.
    fn from_str(s: &str) -> common::Result<Self> {
        let trimmed = s.trim();
        let stripped = trimmed.strip_prefix("http://").unwrap_or(trimmed);
        let stripped = stripped.strip_suffix('/').unwrap_or(stripped);

        let (host, port) = stripped
            .rsplit_once(':')
            .ok_or_else(|| common::Error::backend(format!("{s}: missing port")))?;

        if host.is_empty() || host.contains('/') {
            return Err(common::Error::backend(format!("{s}: invalid host")));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| common::Error::backend(format!("{s}: invalid port")))?;
        if port == 0 {
            return Err(common::Error::backend(format!("{s}: port must be non-zero")));
        }

        Ok(Backend::new(host, port))
    }
}
