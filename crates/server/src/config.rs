//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use crate::state::DEFAULT_AUTH_TIMEOUT;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub auth_timeout: Duration,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PULSE_BIND_ADDR`: listen address (default: "0.0.0.0:8080")
    /// - `PULSE_AUTH_TIMEOUT_SECS`: time allowed for the auth frame (default: 10)
    pub fn from_env() -> anyhow::Result<Self> {
        let raw = std::env::var("PULSE_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid PULSE_BIND_ADDR '{}': {}", raw, e))?;

        let auth_timeout = match std::env::var("PULSE_AUTH_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|e| anyhow::anyhow!("Invalid PULSE_AUTH_TIMEOUT_SECS '{}': {}", raw, e))?,
            Err(_) => DEFAULT_AUTH_TIMEOUT,
        };

        Ok(Self {
            bind_addr,
            auth_timeout,
        })
    }
}
