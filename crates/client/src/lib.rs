//! Pulse Client - live-update channel for the wellness portal
//!
//! Keeps cached query results fresh by listening to server-pushed events and
//! invalidating the cache keys each event type touches. See [`ws`] for the
//! connection lifecycle and [`stores`] for the cache side.

pub mod logging;

pub mod config;
pub mod stores;
pub mod ws;

pub use config::{endpoint_from_origin, ConfigError, LiveConfig};
pub use stores::{CacheInvalidator, QueryCache};
pub use ws::{
    ConnectionState, LiveConnection, LiveHandle, LiveUpdateService, ReconnectConfig, Subscription,
};

pub use pulse_shared::{Envelope, LiveEventKind, QueryKey};
