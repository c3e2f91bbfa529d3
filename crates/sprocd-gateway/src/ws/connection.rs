use axum::{
    extract::{ws::Message, ws::WebSocket, State, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use sprocd_core::config::MAX_PAYLOAD_BYTES;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::app::AppState;
use crate::ws::dispatch::dispatch;
use crate::ws::frames::{EventFrame, ReqFrame};

/// Axum handler: upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| run_connection(socket, state))
}

/// Per-connection loop: pushes every status event and answers requests.
async fn run_connection(socket: WebSocket, state: Arc<AppState>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    state.ws_clients.insert(conn_id.clone(), chrono::Utc::now().to_rfc3339());
    info!(conn_id = %conn_id, "new WS connection");

    let (mut tx, mut rx) = socket.split();
    let mut events = state.broadcaster.subscribe();

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!(conn_id, size = text.len(), "payload too large");
                            break;
                        }
                        let req: ReqFrame = match serde_json::from_str(text.as_str()) {
                            Ok(req) => req,
                            Err(e) => {
                                warn!(conn_id, error = %e, "malformed frame");
                                continue;
                            }
                        };
                        let res = dispatch(&req, &state);
                        if send_json(&mut tx, &res).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(conn_id, error = %e, "WS receive error");
                        break;
                    }
                    _ => {}
                }
            }

            event = events.recv() => {
                match event {
                    Ok(event) => {
                        let frame = EventFrame::new(event.kind.channel(), &event, state.next_seq());
                        if send_json(&mut tx, &frame).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(conn_id, missed, "WS client lagging, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    state.ws_clients.remove(&conn_id);
    info!(conn_id, "WS connection closed");
}

async fn send_json<T: serde::Serialize>(
    tx: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    payload: &T,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(payload).unwrap_or_default();
    tx.send(Message::Text(json.into())).await
}
