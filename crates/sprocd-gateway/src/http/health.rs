use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe with scheduler status.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "running": !state.engine.is_cancelled(),
        "generation": state.engine.generation(),
        "databases": state.engine.schedule().len(),
        "ws_clients": state.ws_clients.len(),
        "event_subscribers": state.broadcaster.subscriber_count(),
    }))
}
