//! WebSocket handler for the live-update channel.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use pulse_shared::{ClientFrame, Envelope};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Wait for the client's auth frame.
async fn authenticate(socket: &mut WebSocket, state: &AppState) -> Option<String> {
    let Ok(first) = tokio::time::timeout(state.auth_timeout, socket.recv()).await else {
        tracing::warn!("WebSocket auth frame not received within {:?}", state.auth_timeout);
        return None;
    };
    let first = first?;

    match first {
        Ok(Message::Text(text)) => match ClientFrame::decode(text.as_str()) {
            Ok(ClientFrame::Auth { user_id }) if !user_id.trim().is_empty() => Some(user_id),
            Ok(_) => {
                tracing::warn!("WebSocket auth frame with empty userId");
                None
            }
            Err(e) => {
                tracing::warn!("WebSocket expected auth frame: {}", e);
                None
            }
        },
        Ok(other) => {
            tracing::warn!("WebSocket expected auth frame, got {:?}", other);
            None
        }
        Err(e) => {
            tracing::warn!("WebSocket error before auth: {}", e);
            None
        }
    }
}

/// Handle one client socket: auth first, then forward pushed envelopes.
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let Some(user_id) = authenticate(&mut socket, &state).await else {
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    let conn_id = Uuid::new_v4();
    let (outbox, mut pending) = mpsc::unbounded_channel::<Envelope>();
    state.track(&user_id, conn_id, outbox).await;
    tracing::info!(
        "WebSocket connection authenticated for user: {} ({} open)",
        user_id,
        state.connection_count(&user_id).await
    );

    let (mut sender, mut receiver) = socket.split();

    // Task to forward pushed envelopes to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(envelope) = pending.recv().await {
            let json = match envelope.encode() {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to encode envelope: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Main receive loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match Envelope::decode(text.as_str()) {
                Ok(envelope) => {
                    tracing::debug!("User {} sent '{}' frame", user_id, envelope.kind)
                }
                Err(e) => tracing::debug!("User {} sent malformed frame: {}", user_id, e),
            },
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    if state.untrack(&user_id, conn_id).await {
        tracing::debug!("Last connection for user {} gone", user_id);
    }

    tracing::info!("WebSocket connection closed for user: {}", user_id);
}
