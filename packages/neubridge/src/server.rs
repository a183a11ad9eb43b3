//! The host's listening WebSocket endpoint.
//!
//! Windows connect here twice over their lifetime: once to announce, and
//! afterwards (with their host token) to call host methods. Every text frame
//! goes through the [`InboundDispatcher`](crate::dispatcher::InboundDispatcher).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade, ws::Message, ws::WebSocket},
    response::Response,
    routing::get,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::InboundDispatcher;
use crate::error::{HostError, Result};

#[derive(Clone)]
struct ServerState {
    dispatcher: Arc<InboundDispatcher>,
    cancel: CancellationToken,
}

pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .map_err(|e| HostError::Config(format!("invalid listen address {host}:{port}: {e}")))?;
    Ok(TcpListener::bind(addr).await?)
}

pub fn router(dispatcher: Arc<InboundDispatcher>, cancel: CancellationToken) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .fallback(websocket_handler)
        .with_state(ServerState { dispatcher, cancel })
}

/// Serve until `cancel` fires.
pub fn serve(
    listener: TcpListener,
    dispatcher: Arc<InboundDispatcher>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let app = router(dispatcher, cancel.clone());
    tokio::spawn(async move {
        if let Ok(addr) = listener.local_addr() {
            info!("neubridge host listening on ws://{}", addr);
        }
        let shutdown = cancel.clone();
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
        {
            error!("host server error: {}", e);
        }
        debug!("host server stopped");
    })
}

async fn websocket_handler(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.dispatcher, state.cancel))
}

async fn handle_socket(
    socket: WebSocket,
    dispatcher: Arc<InboundDispatcher>,
    cancel: CancellationToken,
) {
    debug!("window socket opened");
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Replies for this socket
    let (tx, mut rx) = mpsc::channel::<String>(100);

    let sender_task = async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    };

    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Err(e) = dispatcher.dispatch(text.as_str(), &tx).await {
                        warn!("rejected frame: {}", e);
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("window closed socket");
                    break;
                }
                Err(e) => {
                    debug!("window socket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!("sender task ended"),
        _ = input_task => debug!("input task ended"),
        _ = cancel.cancelled() => debug!("host shutting down, closing window socket"),
    }
}
