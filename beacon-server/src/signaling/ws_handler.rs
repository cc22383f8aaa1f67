use crate::SignalingRelay;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use beacon_core::{ClientMessage, PeerId, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// HTTP surface of the relay: `GET /ws` upgrades to the signaling socket.
pub fn router(relay: SignalingRelay) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .with_state(relay)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(relay): State<SignalingRelay>,
) -> impl IntoResponse {
    let peer_id = PeerId::new();

    ws.on_upgrade(move |socket| handle_socket(socket, peer_id, relay))
}

async fn handle_socket(socket: WebSocket, peer_id: PeerId, relay: SignalingRelay) {
    info!(peer = %peer_id, "New WebSocket connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    relay.connect(peer_id.clone(), tx);

    let mut send_task = tokio::spawn({
        let peer_id = peer_id.clone();

        async move {
            while let Some(msg) = rx.recv().await {
                let json = match msg.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        error!(peer = %peer_id, "Failed to serialize signal message: {}", e);
                        continue;
                    }
                };
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    });

    let mut recv_task = tokio::spawn({
        let relay = relay.clone();
        let peer_id = peer_id.clone();

        async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => match ClientMessage::parse(text.as_str()) {
                        Ok(signal) => relay.dispatch(&peer_id, signal),
                        Err(e) => warn!(peer = %peer_id, "Rejected message: {}", e),
                    },
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    relay.disconnect(&peer_id);
    info!(peer = %peer_id, "WebSocket disconnected");
}
