//! WebSocket listener for companion apps. Each accepted socket becomes a
//! bridge endpoint; frames flow bridge → socket through a channel transport
//! and socket → bridge through `handle_frame`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use sg_bridge::{Bridge, ChannelTransport, TransportEvent};

#[derive(Clone)]
struct AppState {
    bridge: Bridge,
}

pub fn router(bridge: Bridge) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "OK" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { bridge })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state.bridge))
}

async fn handle_socket(socket: WebSocket, bridge: Bridge) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let endpoint_id = bridge.accept(Arc::new(ChannelTransport::new(tx)));
    tracing::info!(%endpoint_id, "websocket connected");

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                TransportEvent::Frame(frame) => {
                    let json = match serde_json::to_string(&frame) {
                        Ok(j) => j,
                        Err(e) => {
                            tracing::error!("failed to serialize frame: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                TransportEvent::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let recv_bridge = bridge.clone();
    let recv_id = endpoint_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => recv_bridge.handle_frame(&recv_id, text.as_str()),
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Either direction ending means the connection is gone.
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    bridge.remove_endpoint(&endpoint_id);
    tracing::info!(%endpoint_id, "websocket closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn router_exposes_ws_and_health() {
        let (bridge, _events) = Bridge::new();
        // Construction wires state and routes; a bad route panics here.
        let _app = router(bridge);
    }
}
