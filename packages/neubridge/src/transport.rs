//! The host's outbound socket to a window.
//!
//! After a window announces, the host connects to the window's own server at
//! `ws://127.0.0.1:<NL_PORT>/?connectToken=<secret>`. Text frames are bridged
//! onto channels so the rest of the host never touches the socket.

use futures::{SinkExt, StreamExt};
use neubridge_proto::ChildToken;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{HostError, Result};

pub struct ChildLink {
    /// Frames to send to the window.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Text frames the window sent. Ends when the socket closes.
    pub inbound: mpsc::UnboundedReceiver<String>,
    /// Cancelling flushes queued frames, then closes the socket.
    pub cancel: CancellationToken,
}

pub fn child_url(port: u16, token: &ChildToken) -> String {
    format!(
        "ws://127.0.0.1:{port}/?connectToken={}",
        token.connect_secret()
    )
}

pub async fn open_child_link(port: u16, token: &ChildToken) -> Result<ChildLink> {
    let url = child_url(port, token);
    debug!(port, "connecting to window");
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .map_err(HostError::from_tungstenite)?;
    Ok(spawn_link(ws_stream))
}

fn spawn_link<S>(ws_stream: WebSocketStream<S>) -> ChildLink
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                Some(text) = out_rx.recv() => {
                    if ws_write.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }

                msg = ws_read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if in_tx.send(text.as_str().to_owned()).is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("window closed its socket");
                            break;
                        }
                        Some(Err(e)) => {
                            debug!("window socket error: {}", e);
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }

                _ = task_cancel.cancelled() => {
                    while let Ok(text) = out_rx.try_recv() {
                        if ws_write.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    let _ = ws_write.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        task_cancel.cancel();
    });

    ChildLink {
        outbound: out_tx,
        inbound: in_rx,
        cancel,
    }
}

/// The far end of an in-memory link.
#[cfg(test)]
pub(crate) struct LinkPeer {
    pub sent: mpsc::UnboundedReceiver<String>,
    pub incoming: mpsc::UnboundedSender<String>,
}

#[cfg(test)]
impl ChildLink {
    pub(crate) fn in_memory() -> (ChildLink, LinkPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        (
            ChildLink {
                outbound: out_tx,
                inbound: in_rx,
                cancel: CancellationToken::new(),
            },
            LinkPeer {
                sent: out_rx,
                incoming: in_tx,
            },
        )
    }
}
