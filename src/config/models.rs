// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    /// Backends in round-robin order.
    pub backends: Vec<Url>,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Frontend endpoint.
    pub listen: String,
    /// Frontend path prefix.
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:80".to_string(),
            path: "/".to_string(),
        }
    }
}

impl ServerConfig {
    /// Parse the listen address. A bare `:port` binds all interfaces.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = match self.listen.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.listen.clone(),
        };

        addr.parse()
            .map_err(|_| ConfigError::InvalidListenAddress(self.listen.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid listen address: {0}")]
    InvalidListenAddress(String),

    #[error("path prefix must start with '/': {0}")]
    InvalidPathPrefix(String),

    #[error("metrics path must start with '/': {0}")]
    InvalidMetricsPath(String),

    #[error("metrics port {0} collides with the proxy listen port")]
    MetricsPortConflict(u16),
}

impl Config {
    /// Check settings that serde cannot. An empty backend list is left to the
    /// dispatcher, since backends may still be supplied on the command line.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.server.listen_addr()?;

        if !self.server.path.starts_with('/') {
            return Err(ConfigError::InvalidPathPrefix(self.server.path.clone()));
        }

        if self.metrics.enabled {
            if !self.metrics.path.starts_with('/') {
                return Err(ConfigError::InvalidMetricsPath(self.metrics.path.clone()));
            }
            if self.metrics.port == addr.port() {
                return Err(ConfigError::MetricsPortConflict(self.metrics.port));
            }
        }

        Ok(())
    }
}
