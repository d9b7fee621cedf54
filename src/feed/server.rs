//! The axum HTTP/websocket surface: `/health` and `/ws`.
//!
//! Split out of `bin/feed_server.rs` so integration tests can build the same
//! router a real deployment serves, rather than re-wiring it ad hoc.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use super::ring::RunSlot;
use super::session::{run_session, SessionConfig};

#[derive(Clone)]
pub struct AppState {
    pub run_slot: Arc<RunSlot>,
    pub session_config: SessionConfig,
    next_session_id: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(run_slot: Arc<RunSlot>, session_config: SessionConfig) -> Self {
        Self { run_slot, session_config, next_session_id: Arc::new(AtomicU64::new(1)) }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    "OK"
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let session_id = state.next_session_id.fetch_add(1, Ordering::Relaxed);
    ws.on_upgrade(move |socket| async move {
        run_session(socket, state.run_slot, state.session_config, format!("session-{session_id}")).await;
    })
}
