//! Control surface: start / cancel the engine and inspect what it runs.

use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;

/// GET /databases: configured database names, in load order.
pub async fn list_databases(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "databases": state.engine.list_database_names() }))
}

/// GET /lineages: one snapshot per `(database, group)`.
pub async fn list_lineages(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "generation": state.engine.generation(),
        "lineages": state.engine.lineages(),
    }))
}

/// POST /start: begin a new generation, superseding any running one.
pub async fn start(State(state): State<Arc<AppState>>) -> Json<Value> {
    let generation = state.engine.start();
    info!(%generation, "start requested over HTTP");
    Json(json!({ "ok": true, "generation": generation }))
}

/// POST /cancel: stop issuing new work. Idempotent.
pub async fn cancel(State(state): State<Arc<AppState>>) -> Json<Value> {
    state.engine.cancel();
    info!("cancel requested over HTTP");
    Json(json!({ "ok": true, "generation": state.engine.generation() }))
}
