//! Wire protocol for the live-update channel.
//!
//! Every frame is a JSON text frame. The server pushes
//! `{"type": "<kind>", "data": <any>}`; the client answers each successful
//! open with exactly one `{"type": "auth", "userId": "<identity>"}`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// The `{type, data}` wrapper around every frame on the channel.
///
/// `kind` is kept as a plain string so unrecognized types still decode; use
/// [`Envelope::event_kind`] to dispatch on the known set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Decode a single text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// The known event kind, or `None` for types this build does not know.
    pub fn event_kind(&self) -> Option<LiveEventKind> {
        self.kind.parse().ok()
    }
}

/// Frames originated by the client outside of application envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientFrame {
    /// Sent once per successful open, before anything else.
    Auth {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl ClientFrame {
    pub fn auth(user_id: impl Into<String>) -> Self {
        ClientFrame::Auth {
            user_id: user_id.into(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

/// Server-pushed event types the client knows how to route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveEventKind {
    Notification,
    HealthUpdate,
    BookingUpdate,
    ProtocolUpdate,
    CommunityUpdate,
    AuditLog,
}

impl LiveEventKind {
    pub const ALL: [LiveEventKind; 6] = [
        LiveEventKind::Notification,
        LiveEventKind::HealthUpdate,
        LiveEventKind::BookingUpdate,
        LiveEventKind::ProtocolUpdate,
        LiveEventKind::CommunityUpdate,
        LiveEventKind::AuditLog,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LiveEventKind::Notification => "notification",
            LiveEventKind::HealthUpdate => "health_update",
            LiveEventKind::BookingUpdate => "booking_update",
            LiveEventKind::ProtocolUpdate => "protocol_update",
            LiveEventKind::CommunityUpdate => "community_update",
            LiveEventKind::AuditLog => "audit_log",
        }
    }
}

impl fmt::Display for LiveEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned for type strings outside the known set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl FromStr for LiveEventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LiveEventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_string()))
    }
}
