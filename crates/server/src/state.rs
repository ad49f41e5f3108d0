//! Application state shared across request handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pulse_shared::Envelope;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

type Outbox = mpsc::UnboundedSender<Envelope>;

/// How long a fresh socket may stay silent before sending its auth frame.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Authenticated sockets, by user id then connection id.
    connections: Arc<RwLock<HashMap<String, HashMap<Uuid, Outbox>>>>,
    pub auth_timeout: Duration,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            connections: Arc::default(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_timeout(mut self, auth_timeout: Duration) -> Self {
        self.auth_timeout = auth_timeout;
        self
    }

    /// Track an authenticated socket for `user_id`.
    pub async fn track(&self, user_id: &str, conn_id: Uuid, outbox: Outbox) {
        let mut connections = self.connections.write().await;
        connections
            .entry(user_id.to_string())
            .or_default()
            .insert(conn_id, outbox);
    }

    /// Remove a socket. Returns true if it was the user's last one.
    pub async fn untrack(&self, user_id: &str, conn_id: Uuid) -> bool {
        let mut connections = self.connections.write().await;
        let Some(user_connections) = connections.get_mut(user_id) else {
            return false;
        };
        user_connections.remove(&conn_id);
        if user_connections.is_empty() {
            connections.remove(user_id);
            return true;
        }
        false
    }

    /// Queue `envelope` on every socket of `user_id`. Returns the number of
    /// sockets it was queued on.
    pub async fn push(&self, user_id: &str, envelope: &Envelope) -> usize {
        let connections = self.connections.read().await;
        connections
            .get(user_id)
            .map(|sockets| {
                sockets
                    .values()
                    .filter(|outbox| outbox.send(envelope.clone()).is_ok())
                    .count()
            })
            .unwrap_or(0)
    }

    pub async fn connection_count(&self, user_id: &str) -> usize {
        self.connections
            .read()
            .await
            .get(user_id)
            .map_or(0, HashMap::len)
    }
}
