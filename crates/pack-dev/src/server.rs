//! HTTP side of the dev server: the `/__hmr` WebSocket.

use crate::hub::HmrHub;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use pack_core::HmrMessage;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

/// Path the client runtime connects to.
pub const HMR_PATH: &str = "/__hmr";

/// Subprotocol the client runtime asks for.
pub const HMR_PROTOCOL: &str = "pack-hmr";

/// Build the dev server router.
pub fn router(hub: HmrHub) -> Router {
    Router::new()
        .route(HMR_PATH, get(hmr_websocket))
        .with_state(hub)
}

/// Handle WebSocket connections for HMR.
async fn hmr_websocket(ws: WebSocketUpgrade, State(hub): State<HmrHub>) -> impl IntoResponse {
    ws.protocols([HMR_PROTOCOL])
        .on_upgrade(move |socket| handle_hmr_socket(socket, hub))
}

/// Greet the client, then forward hub messages until either side hangs up.
async fn handle_hmr_socket(socket: WebSocket, hub: HmrHub) {
    let mut rx = hub.subscribe();
    let (mut sender, mut receiver) = socket.split();
    debug!(clients = hub.clients(), "hmr client connected");

    if send(&mut sender, &HmrMessage::Connected).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed updates cannot be replayed
                        warn!(skipped, "hmr client lagged, forcing reload");
                        HmrMessage::Reload
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut sender, &msg).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("hmr client disconnected");
}

async fn send(
    sender: &mut SplitSink<WebSocket, Message>,
    message: &HmrMessage,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).map_err(axum::Error::new)?;
    sender.send(Message::Text(text)).await
}
