//! WebSocket relay: carries sync hints to surfaces in other processes.
//!
//! Every connection is a surface of its own: hints it sends are republished
//! into the hub, and hints from everyone else are forwarded to it.

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use super::channel::{SurfaceId, SyncChannel, SyncHub, SyncSignal, SyncTopic};

/// Frames exchanged with relay clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncFrame {
    /// Sent once on connect (server → client).
    Connected { surface: SurfaceId },
    /// Todo data changed.
    TodoSync,
    /// Category data changed.
    CategorySync,
}

impl From<SyncTopic> for SyncFrame {
    fn from(topic: SyncTopic) -> Self {
        match topic {
            SyncTopic::TodoSync => Self::TodoSync,
            SyncTopic::CategorySync => Self::CategorySync,
        }
    }
}

impl SyncFrame {
    fn topic(&self) -> Option<SyncTopic> {
        match self {
            Self::TodoSync => Some(SyncTopic::TodoSync),
            Self::CategorySync => Some(SyncTopic::CategorySync),
            Self::Connected { .. } => None,
        }
    }
}

/// Shared state for the relay.
#[derive(Clone)]
pub struct RelayState {
    pub hub: SyncHub,
}

/// Build the Axum router for `/ws/sync` and `/health`.
pub fn sync_routes(hub: SyncHub) -> Router {
    Router::new()
        .route("/ws/sync", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(RelayState { hub })
}

async fn health(State(state): State<RelayState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "todo-sync-relay",
        "subscribers": state.hub.receiver_count(),
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<RelayState>) -> impl IntoResponse {
    info!("Sync relay client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn send_frame(socket: &mut WebSocket, frame: &SyncFrame) -> bool {
    match serde_json::to_string(frame) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to encode sync frame");
            true
        }
    }
}

async fn handle_socket(mut socket: WebSocket, state: RelayState) {
    let channel = state.hub.channel();
    let surface = channel.surface();
    info!(%surface, "Sync relay client connected");

    // Subscribe before greeting so no hint slips between the two.
    let mut rx = channel.subscribe();

    if !send_frame(&mut socket, &SyncFrame::Connected { surface }).await {
        warn!(%surface, "Failed to greet sync client, client disconnected");
        return;
    }

    loop {
        tokio::select! {
            // Forward hints from other surfaces to this client
            signal = rx.recv() => {
                match signal {
                    Some(SyncSignal::Changed(topic)) => {
                        if !send_frame(&mut socket, &SyncFrame::from(topic)).await {
                            debug!(%surface, "Sync client disconnected during send");
                            break;
                        }
                    }
                    Some(SyncSignal::Lagged(n)) => {
                        warn!(%surface, missed = n, "Sync client lagged behind broadcast");
                        // Missed hints could be on either topic.
                        if !send_frame(&mut socket, &SyncFrame::TodoSync).await
                            || !send_frame(&mut socket, &SyncFrame::CategorySync).await
                        {
                            break;
                        }
                    }
                    None => {
                        debug!("Sync hub closed");
                        break;
                    }
                }
            }

            // Receive hints from the client
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_frame(&text, &channel);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!(%surface, "Sync relay client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(%surface, error = %e, "Sync relay WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(%surface, "Sync relay connection closed");
}

fn handle_client_frame(text: &str, channel: &SyncChannel) {
    match serde_json::from_str::<SyncFrame>(text) {
        Ok(frame) => match frame.topic() {
            Some(topic) => channel.broadcast(topic),
            None => debug!(text = text, "Ignoring server-only frame from client"),
        },
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized sync frame");
        }
    }
}
