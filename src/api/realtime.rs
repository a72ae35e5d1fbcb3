//! Realtime observer channel.
//!
//! `GET /ws` upgrades to a WebSocket. A new observer immediately receives the
//! current stats and log, then every broadcast as it happens. Frames are JSON
//! envelopes of `{ "event": ..., "data": ... }`. Observers that fall behind
//! the channel buffer lose the skipped updates and pick up from the next one.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::broadcast::{BroadcastMessage, EVENT_LOGS, EVENT_STATS};

/// GET /ws - subscribe to live state updates.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut updates = state.engine.broadcaster().subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("Observer connected");

    // Initial push so a fresh dashboard renders without waiting for traffic.
    let stats = state.engine.stats().await;
    let logs = state.engine.logs(None).await;
    let initial = [
        BroadcastMessage::new(EVENT_STATS, serde_json::to_value(&stats).unwrap_or_default()),
        BroadcastMessage::new(EVENT_LOGS, serde_json::to_value(&logs).unwrap_or_default()),
    ];
    for msg in initial {
        if sender.send(Message::Text(msg.to_frame().into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(msg) => {
                    if sender.send(Message::Text(msg.to_frame().into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Observer fell behind, updates dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {} // inbound frames are ignored
                Some(Err(err)) => {
                    debug!(error = %err, "Observer socket error");
                    break;
                }
            },
        }
    }

    debug!("Observer disconnected");
}
