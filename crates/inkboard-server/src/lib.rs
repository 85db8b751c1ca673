//! Inkboard WebSocket Relay Server
//!
//! Keeps the authoritative board in memory, bootstraps every new connection
//! with it and relays board events between clients.
//!
//! ## Protocol
//!
//! One JSON text frame per event:
//! ```json
//! { "event": "init", "data": { "canvasImage": null, "notes": [] } }
//! { "event": "addNote", "data": { "id": "n1", "type": "note", "content": "hi", "x": 10, "y": 20 } }
//! { "event": "clear" }
//! ```
//! Events are relayed to every other connection; `clear` also goes back to
//! its sender.

pub mod config;
pub mod relay;
pub mod store;

use std::path::Path;

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
use inkboard_core::protocol::{ClientEvent, ConnectionId};
use relay::CHANNEL_CAPACITY;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use config::ServerConfig;
pub use relay::RelayHandle;
pub use store::BoardStore;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Build the HTTP router around a running relay.
pub fn router(relay: RelayHandle, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(relay)
}

/// Serve on an already bound listener with a fresh, empty board.
pub async fn serve(listener: TcpListener, static_dir: impl AsRef<Path>) -> Result<(), ServerError> {
    let relay = relay::spawn(BoardStore::new());
    axum::serve(listener, router(relay, static_dir)).await?;
    Ok(())
}

/// Bind the configured address and serve until the process stops.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let listener = TcpListener::bind(config.addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: config.addr,
            source,
        })?;

    info!("Inkboard relay server listening on {}", config.addr);
    info!("WebSocket endpoint: ws://localhost:{}/ws", config.addr.port());
    info!("Serving static files from {}", config.static_dir.display());

    serve(listener, &config.static_dir).await
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(relay): State<RelayHandle>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, relay: RelayHandle) {
    let id: ConnectionId = Uuid::new_v4().to_string();
    info!("New connection: {}", id);

    let (mut sender, mut receiver) = socket.split();
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    if relay.connect(id.clone(), frame_tx).is_err() {
        warn!("Relay unavailable, dropping connection {}", id);
        return;
    }

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match ClientEvent::decode(text.as_str()) {
                        Ok(event) => {
                            debug!("{} from {}", event.name(), id);
                            if relay.inbound(id.clone(), event).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Invalid message from {}: {}", id, e),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary, ping, pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", id, e);
                        break;
                    }
                }
            }

            // Forward relayed frames to the client
            frame = frame_rx.recv() => {
                match frame {
                    Some(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    // Cleanup on disconnect
    let _ = relay.disconnect(id.clone());
    info!("Connection closed: {}", id);
}
