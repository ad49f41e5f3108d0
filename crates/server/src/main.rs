//! Pulse Server - development push server for the live-update channel
//!
//! Accepts channel connections at the origin root, reads each client's auth
//! frame, and fans out events posted to `/api/events` to the addressed user.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod routes;
mod state;
mod ws;

use config::ServerConfig;
use state::AppState;

/// Application routes.
fn app(state: AppState) -> Router {
    Router::new()
        // Live-update channel
        .route("/", get(ws::ws_handler))
        // Event injection
        .route("/api/events", post(routes::events::push_event))
        .route("/api/health", get(routes::health))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pulse_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let state = AppState::new().with_auth_timeout(config.auth_timeout);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let router = app(state).layer(TraceLayer::new_for_http()).layer(cors);

    // Start server
    tracing::info!("Starting server on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
