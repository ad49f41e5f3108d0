//! API route handlers.

pub mod events;

/// Liveness check.
pub async fn health() -> &'static str {
    "ok"
}
