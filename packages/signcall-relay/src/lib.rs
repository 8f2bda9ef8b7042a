//! SignCall Relay Server
//!
//! A WebSocket signaling relay for one-to-one video calls:
//!
//! 1. **Presence**: clients announce a profile with `addNewUser`; every
//!    change to the online set is broadcast to all open connections.
//!
//! 2. **Call setup**: `call`, `webrtcSignal` and `hangup` events are routed
//!    to the other participant by user id. SDP is forwarded untouched.
//!
//! 3. **In-call chat**: `message` events are validated against the presence
//!    table and delivered to the other participant only.
//!
//! The relay keeps no state beyond the connections currently open.

pub mod handler;
pub mod registry;
pub mod relay;
pub mod state;

use axum::{
    extract::{State, WebSocketUpgrade},
    http::Method,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{RelayConfig, RelayState};

/// Build the HTTP router serving `/ws`, `/health` and `/stats`.
pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// WebSocket upgrade handler for client connections.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handler::handle_websocket(socket, state))
}

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "signcall-relay",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Body of `GET /stats`.
#[derive(Debug, Serialize)]
pub struct Stats {
    pub online_users: usize,
    pub open_channels: usize,
}

impl Stats {
    pub fn collect(state: &RelayState) -> Self {
        Self {
            online_users: state.online_count(),
            open_channels: state.open_channel_count(),
        }
    }
}

async fn stats_handler(State(state): State<RelayState>) -> impl IntoResponse {
    Json(Stats::collect(&state))
}
