//! Seams between the connection state machine and the outside world.
//!
//! The [`LiveConnection`](super::LiveConnection) never touches sockets or
//! clocks directly. It asks a [`Transport`] to open, write to and close
//! channels, and a [`Scheduler`] to fire reconnect timers; both report back by
//! calling into the connection with the ids it handed out. Late reports for
//! ids the connection no longer owns are ignored, which is what keeps at most
//! one live channel and one pending timer per connection.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

#[cfg(not(target_arch = "wasm32"))]
mod tungstenite;

#[cfg(not(target_arch = "wasm32"))]
pub use tungstenite::{TokioScheduler, TungsteniteTransport};

#[cfg(target_arch = "wasm32")]
mod browser;

#[cfg(target_arch = "wasm32")]
pub use browser::{GlooScheduler, WebSocketTransport};

/// Identifies one channel opened by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel#{}", self.0)
    }
}

/// Identifies one scheduled reconnect timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Everything a transport can report about a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    /// Always followed by `Closed` for the same channel.
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{0} is not open")]
    NotOpen(ChannelId),
    #[error("Failed to open {channel}: {reason}")]
    Open { channel: ChannelId, reason: String },
    #[error("Send on {channel} failed: {reason}")]
    Send { channel: ChannelId, reason: String },
}

/// A message-oriented, full-duplex channel factory.
pub trait Transport {
    /// Start opening `channel`. Completion is reported later as
    /// [`TransportEvent::Open`] or [`TransportEvent::Closed`].
    fn open(&mut self, channel: ChannelId, url: &Url) -> Result<(), TransportError>;

    fn send(&mut self, channel: ChannelId, text: String) -> Result<(), TransportError>;

    /// Close `channel`. Events reported for it afterwards are ignored.
    fn close(&mut self, channel: ChannelId);
}

/// One-shot timers that report back by id.
pub trait Scheduler {
    fn schedule(&mut self, timer: TimerId, delay: Duration);

    /// A cancelled timer that still reports is ignored by the connection.
    fn cancel(&mut self, timer: TimerId);
}
