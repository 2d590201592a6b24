//! Server configuration
//!
//! Defaults, `SIGNAL_RELAY_*` environment variables and command-line flags
//! are layered by clap (see [`crate::cli::ServeArgs`]); this module turns
//! the resolved values into a validated [`ServerConfig`].

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, SignalError};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:8080", "http://127.0.0.1:8080"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
    /// Interval between keep-alive pings on each signaling socket
    pub heartbeat_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|o| o.to_string())
                .collect(),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        }
    }
}

impl ServerConfig {
    /// Build a config from resolved settings and validate it
    pub fn new<I, S>(host: &str, port: u16, allowed_origins: I, heartbeat_secs: u64) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let config = Self {
            host: host.trim().to_string(),
            port,
            allowed_origins: allowed_origins
                .into_iter()
                .map(|o| o.as_ref().trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            heartbeat_interval: Duration::from_secs(heartbeat_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(SignalError::InvalidConfig(
                "heartbeat interval must be at least one second".to_string(),
            ));
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| SignalError::InvalidConfig(format!("invalid listen address '{}'", self.host)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(
            config.allowed_origins,
            vec!["http://localhost:8080", "http://127.0.0.1:8080"]
        );
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_new_trims_origins() {
        let config = ServerConfig::new(
            "0.0.0.0",
            9100,
            ["https://a.example", " https://b.example", ""],
            5,
        )
        .unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9100);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_heartbeat_rejected() {
        let err = ServerConfig::new(DEFAULT_HOST, DEFAULT_PORT, DEFAULT_ALLOWED_ORIGINS, 0)
            .unwrap_err();
        assert!(matches!(err, SignalError::InvalidConfig(_)));
        assert_eq!(err.to_error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_invalid_host_rejected() {
        let err = ServerConfig::new("not a host", DEFAULT_PORT, DEFAULT_ALLOWED_ORIGINS, 30)
            .unwrap_err();
        assert!(err.to_string().contains("not a host"));
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig::default();
        assert_eq!(
            config.socket_addr().unwrap(),
            "127.0.0.1:8000".parse::<SocketAddr>().unwrap()
        );
    }
}
