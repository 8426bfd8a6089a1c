//! # routes::monitor
//!
//! ## Endpoints
//!
//! | Method    | Path                | Description                          |
//! |-----------|---------------------|--------------------------------------|
//! | GET (WS)  | `/ws/monitor`       | Real-time [`WsEvent`](crate::events::WsEvent) stream |
//! | GET       | `/api/monitor/open` | Registry snapshot (open positions)   |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::state::SharedState;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    // ── Snapshot on connect ───────────────────────────────────────────────────
    let snapshot = {
        let open = state.service.open_registrations().await;
        json!({
            "event":          "SNAPSHOT",
            "open_count":     open.len(),
            "open_positions": open,
        })
        .to_string()
    };

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── GET /api/monitor/open ────────────────────────────────────────────────────

pub async fn get_open_positions(State(state): State<SharedState>) -> impl IntoResponse {
    let open = state.service.open_registrations().await;
    Json(json!({
        "ok":        true,
        "count":     open.len(),
        "positions": open,
    }))
}
