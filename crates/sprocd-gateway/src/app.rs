use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use sprocd_core::SprocdConfig;
use sprocd_scheduler::{BroadcastSink, SchedulerEngine};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Central shared state, passed as `Arc<AppState>` to all Axum handlers.
pub struct AppState {
    pub config: SprocdConfig,
    pub engine: SchedulerEngine,
    /// Same sink the engine emits into; WS connections subscribe here.
    pub broadcaster: Arc<BroadcastSink>,
    pub event_seq: AtomicU64,
    /// Open WS connections: conn_id -> connect time (RFC 3339).
    pub ws_clients: DashMap<String, String>,
}

impl AppState {
    pub fn new(
        config: SprocdConfig,
        engine: SchedulerEngine,
        broadcaster: Arc<BroadcastSink>,
    ) -> Self {
        Self {
            config,
            engine,
            broadcaster,
            event_seq: AtomicU64::new(0),
            ws_clients: DashMap::new(),
        }
    }

    /// Monotonically increasing sequence for pushed event frames.
    pub fn next_seq(&self) -> u64 {
        self.event_seq.fetch_add(1, Ordering::Relaxed)
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/databases", get(crate::http::control::list_databases))
        .route("/lineages", get(crate::http::control::list_lineages))
        .route("/start", post(crate::http::control::start))
        .route("/cancel", post(crate::http::control::cancel))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
