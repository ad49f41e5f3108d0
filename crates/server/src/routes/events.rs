//! Event injection: push a typed envelope to a user's open channels.

use axum::{extract::State, http::StatusCode, Json};
use pulse_shared::{Envelope, ProblemDetails};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEventRequest {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PushEventResponse {
    pub delivered: usize,
}

/// POST /api/events
pub async fn push_event(
    State(state): State<AppState>,
    Json(req): Json<PushEventRequest>,
) -> Result<Json<PushEventResponse>, (StatusCode, Json<ProblemDetails>)> {
    if req.user_id.trim().is_empty() {
        return Err(bad_request("userId must not be empty"));
    }
    if req.kind.trim().is_empty() {
        return Err(bad_request("type must not be empty"));
    }

    let envelope = Envelope::new(req.kind, req.data);
    let delivered = state.push(&req.user_id, &envelope).await;
    tracing::debug!(
        "Pushed '{}' to {} socket(s) of {}",
        envelope.kind,
        delivered,
        req.user_id
    );

    Ok(Json(PushEventResponse { delivered }))
}

fn bad_request(detail: &str) -> (StatusCode, Json<ProblemDetails>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ProblemDetails::bad_request(detail)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn request(user_id: &str, kind: &str) -> Json<PushEventRequest> {
        Json(PushEventRequest {
            user_id: user_id.to_string(),
            kind: kind.to_string(),
            data: json!({"id": 1}),
        })
    }

    #[tokio::test]
    async fn delivers_to_connected_user() {
        let state = AppState::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        state.track("user-1", Uuid::new_v4(), tx).await;

        let Json(response) = push_event(State(state), request("user-1", "community_update"))
            .await
            .unwrap();

        assert_eq!(response, PushEventResponse { delivered: 1 });
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.kind, "community_update");
        assert_eq!(envelope.data, json!({"id": 1}));
    }

    #[tokio::test]
    async fn rejects_blank_fields() {
        let (status, Json(problem)) = push_event(State(AppState::new()), request(" ", "notification"))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(problem.status, 400);

        let (status, _) = push_event(State(AppState::new()), request("user-1", ""))
            .await
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn request_parses_wire_shape() {
        let req: PushEventRequest =
            serde_json::from_value(json!({"userId": "u", "type": "audit_log"})).unwrap();
        assert_eq!(req.user_id, "u");
        assert_eq!(req.kind, "audit_log");
        assert_eq!(req.data, serde_json::Value::Null);
    }
}
