use crate::error::{ProxyError, Result};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy server configuration
    pub proxy: ProxyServerConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ProxyServerConfig {
    /// Port for the proxy server (default: 8082)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Maximum concurrent connections admitted by the worker pool
    pub max_connections: usize,
    /// Maximum size of a request header block in bytes
    pub max_header_bytes: usize,
    /// Upstream dial timeout in seconds
    pub connect_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            proxy: ProxyServerConfig {
                port: get_env_or("PASSAGE_PORT", "8082").parse().map_err(|_| {
                    ProxyError::InvalidConfig("PASSAGE_PORT must be a valid port number".into())
                })?,
                host: get_env_or("PASSAGE_HOST", "0.0.0.0"),
                max_connections: get_env_or("PASSAGE_MAX_CONNECTIONS", "64")
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        ProxyError::InvalidConfig(
                            "PASSAGE_MAX_CONNECTIONS must be a positive number".into(),
                        )
                    })?,
                max_header_bytes: get_env_or("PASSAGE_MAX_HEADER_BYTES", "32768")
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        ProxyError::InvalidConfig(
                            "PASSAGE_MAX_HEADER_BYTES must be a positive number".into(),
                        )
                    })?,
                connect_timeout: get_env_or("PASSAGE_CONNECT_TIMEOUT", "10")
                    .parse()
                    .unwrap_or(10),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the proxy server bind address
    pub fn proxy_addr(&self) -> String {
        format!("{}:{}", self.proxy.host, self.proxy.port)
    }
}

impl ProxyServerConfig {
    /// Upstream dial timeout as a `Duration`
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
