//! Live-update channel: keeps cached query results fresh from server pushes.
//!
//! This module provides:
//! - A connection state machine with bounded exponential reconnect
//! - Routing of pushed event types to cache invalidations
//! - One process-wide service that every UI surface shares
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │ Component  │ │ Component  │ │ Component  │
//! │ (holds a   │ │ (holds a   │ │ (reads     │
//! │  Subscr.)  │ │  Subscr.)  │ │  cache)    │
//! └────────────┘ └────────────┘ └────────────┘
//!        │              │              ▲
//!        └──────┬───────┘              │
//!               ▼                      │
//! ┌──────────────────────────┐         │
//! │    LiveUpdateService     │         │
//! │ (one per session, owns   │         │
//! │  the only LiveConnection)│         │
//! └──────────────────────────┘         │
//!               │ push: {type, data}   │
//!               ▼                      │
//! ┌──────────────────────────┐  ┌─────────────┐
//! │  router::resolve(type)   │─▶│ QueryCache  │
//! │  → cache keys            │  │ invalidate  │
//! └──────────────────────────┘  └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let cache = QueryCache::new();
//! let live = LiveUpdateService::spawn(LiveConfig::from_env(), cache.clone())?;
//!
//! // On login
//! live.start_session(user_id);
//!
//! // In a screen that wants fresh data
//! let subscription = live.subscribe();
//! if !subscription.is_connected() {
//!     // fall back to polling
//! }
//! ```

mod backoff;
mod connection;
pub mod transport;

mod manager;

#[cfg(feature = "dioxus")]
mod hooks;

pub use backoff::ReconnectConfig;
pub use connection::{ConnectionState, LiveConnection};

pub use manager::{LiveHandle, LiveUpdateService, Subscription};

#[cfg(feature = "dioxus")]
pub use hooks::{use_cache_generation, use_live_updates};
