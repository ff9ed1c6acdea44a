// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! HTTP surface: join, health, diagnostics, world reset, and the
//! WebSocket upgrade.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use lode_core::config::ResetRequest;

use crate::hub::Hub;
use crate::ws::serve_socket;

/// Builds the server router.
pub fn router(hub: Arc<Hub>) -> Router {
    Router::new()
        .route("/join", post(join_handler))
        .route("/health", get(health_handler))
        .route("/diagnostics", get(diagnostics_handler))
        .route("/world/reset", post(reset_handler))
        .route("/ws", get(ws_handler))
        .with_state(hub)
}

async fn join_handler(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    let snapshot = hub.join().await;
    info!(player = %snapshot.id, "join");
    (StatusCode::OK, Json(snapshot))
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn diagnostics_handler(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    Json(hub.diagnostics().await)
}

async fn reset_handler(
    State(hub): State<Arc<Hub>>,
    Json(request): Json<ResetRequest>,
) -> impl IntoResponse {
    let config = hub.reset_world(&request).await;
    Json(config)
}

#[derive(Debug, Deserialize)]
struct WsQuery {
    id: String,
}

async fn ws_handler(
    State(hub): State<Arc<Hub>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_socket(socket, hub, query.id))
}
