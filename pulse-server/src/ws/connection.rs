//! WebSocket connection handling

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use crate::AppState;
use crate::error::SessionError;
use crate::registry::SessionSink;

use super::lifecycle::Session;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    let sink = Arc::new(WsSink::new(sender));

    Session::new(Arc::clone(&state.registry), sink)
        .with_close_timeout(state.broadcast.write_timeout)
        .run(receiver, state.shutdown.clone())
        .await;
}

/// Write half of an upgraded WebSocket.
pub struct WsSink {
    sender: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSink {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

#[async_trait]
impl SessionSink for WsSink {
    async fn send(&self, payload: Arc<str>) -> Result<(), SessionError> {
        self.sender
            .lock()
            .await
            .send(Message::Text(payload.to_string()))
            .await
            .map_err(|e| SessionError::Send(e.to_string()))
    }

    async fn close(&self) {
        // Already-closed transports reject the close frame; nothing to do then.
        let _ = self.sender.lock().await.close().await;
    }
}
