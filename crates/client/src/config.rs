//! Client configuration from environment variables.

use thiserror::Error;
use url::Url;

use crate::ws::ReconnectConfig;

const DEFAULT_ORIGIN: &str = "http://localhost:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid origin '{origin}': {source}")]
    InvalidOrigin {
        origin: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Unsupported origin scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),
    #[error("Origin '{0}' has no host")]
    MissingHost(String),
}

/// Settings for the live-update channel.
#[derive(Debug, Clone)]
pub struct LiveConfig {
    /// Origin the application is served from, e.g. `https://app.example.com`.
    pub origin: String,
    pub reconnect: ReconnectConfig,
}

impl LiveConfig {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Parse configuration from environment variables.
    ///
    /// In the browser the origin is the page's own (`window.location.origin`)
    /// and the reconnect settings keep their defaults.
    ///
    /// Environment variables:
    /// - `PULSE_ORIGIN`: application origin (default: "http://localhost:8080")
    /// - `PULSE_RECONNECT_MAX_ATTEMPTS`: reconnect ceiling, 0 = unbounded (default: 5)
    /// - `PULSE_RECONNECT_INITIAL_MS`: first reconnect delay (default: 1000)
    /// - `PULSE_RECONNECT_MAX_MS`: delay ceiling (default: 30000)
    /// - `PULSE_RECONNECT_MULTIPLIER`: growth factor per attempt (default: 2.0)
    ///
    /// Unparseable values fall back to the default and are logged.
    pub fn from_env() -> Self {
        let origin = current_origin().unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let defaults = ReconnectConfig::default();

        let reconnect = ReconnectConfig {
            max_attempts: env_or("PULSE_RECONNECT_MAX_ATTEMPTS", defaults.max_attempts),
            initial_delay_ms: env_or("PULSE_RECONNECT_INITIAL_MS", defaults.initial_delay_ms),
            max_delay_ms: env_or("PULSE_RECONNECT_MAX_MS", defaults.max_delay_ms),
            backoff_multiplier: env_or("PULSE_RECONNECT_MULTIPLIER", defaults.backoff_multiplier),
        };

        Self { origin, reconnect }
    }

    /// The channel endpoint for this origin.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        endpoint_from_origin(&self.origin)
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ORIGIN)
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn current_origin() -> Option<String> {
    std::env::var("PULSE_ORIGIN").ok()
}

#[cfg(target_arch = "wasm32")]
fn current_origin() -> Option<String> {
    web_sys::window()?.location().origin().ok()
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            crate::log_warn!("Ignoring invalid {}={:?}, using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

/// Derive the channel endpoint from the page origin.
///
/// The scheme mirrors the page's transport security (`https` becomes `wss`,
/// `http` becomes `ws`), host and port are kept, and the path is always the
/// root. Query and fragment are dropped.
pub fn endpoint_from_origin(origin: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(origin).map_err(|source| ConfigError::InvalidOrigin {
        origin: origin.to_string(),
        source,
    })?;

    let scheme = match parsed.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    };

    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ConfigError::MissingHost(origin.to_string()))?;

    let authority = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    Url::parse(&format!("{}://{}/", scheme, authority)).map_err(|source| {
        ConfigError::InvalidOrigin {
            origin: origin.to_string(),
            source,
        }
    })
}
