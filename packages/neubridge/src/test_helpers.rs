//! Fakes for driving a real host end to end.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use neubridge_proto::message::{ANNOUNCE_COMMAND, EVENTS_BROADCAST_METHOD};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::Result;
use crate::launcher::{Launcher, spawn_piped};
use crate::lifecycle::Troubleshooter;

pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Stands in for a Neutralino process's own WebSocket server.
///
/// Records the `connectToken` every host connection presents and every frame
/// the host sends. Replies go to the most recently accepted socket.
pub struct FakeWindow {
    pub port: u16,
    pub token: String,
    connect_tokens: mpsc::UnboundedReceiver<Option<String>>,
    frames: mpsc::UnboundedReceiver<Value>,
    writer: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

impl FakeWindow {
    pub async fn start() -> Self {
        Self::with_token("nlsess.s3cr3t").await
    }

    pub async fn with_token(token: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (token_tx, connect_tokens) = mpsc::unbounded_channel();
        let (frame_tx, frames) = mpsc::unbounded_channel();
        let writer = Arc::new(Mutex::new(None));

        let current = writer.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let mut query = None;
                let callback = |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
                    query = req.uri().query().map(str::to_string);
                    Ok(resp)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                let connect_token = query.as_deref().and_then(|q| {
                    q.split('&')
                        .find_map(|pair| pair.strip_prefix("connectToken="))
                        .map(str::to_string)
                });
                let _ = token_tx.send(connect_token);

                let (mut sink, mut stream) = ws.split();
                let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
                *current.lock().unwrap() = Some(out_tx);
                tokio::spawn(async move {
                    while let Some(text) = out_rx.recv().await {
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                });
                let frame_tx = frame_tx.clone();
                tokio::spawn(async move {
                    while let Some(Ok(msg)) = stream.next().await {
                        if let Message::Text(text) = msg {
                            if let Ok(value) = serde_json::from_str(text.as_str()) {
                                let _ = frame_tx.send(value);
                            }
                        }
                    }
                });
            }
        });

        Self {
            port,
            token: token.to_string(),
            connect_tokens,
            frames,
            writer,
        }
    }

    /// Send `announceSelf` to the host as `name`. The returned socket stays
    /// open and can be used for authenticated requests.
    pub async fn announce(&self, host_port: u16, name: &str) -> HostSocket {
        let mut socket = HostSocket::connect(host_port).await;
        socket
            .send(json!({
                "command": ANNOUNCE_COMMAND,
                "NL_PORT": self.port,
                "NL_TOKEN": self.token,
                "name": name,
            }))
            .await;
        socket
    }

    pub async fn next_connect_token(&mut self) -> Option<String> {
        tokio::time::timeout(STEP_TIMEOUT, self.connect_tokens.recv())
            .await
            .expect("no host connection")
            .expect("listener gone")
    }

    /// Whether the host opens a socket to this window within `wait`.
    pub async fn connected_within(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, self.connect_tokens.recv())
            .await
            .is_ok()
    }

    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(STEP_TIMEOUT, self.frames.recv())
            .await
            .expect("no frame from host")
            .expect("listener gone")
    }

    /// Skip frames until an `events.broadcast` carrying `event`; returns its data.
    pub async fn next_event(&mut self, event: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["method"] == EVENTS_BROADCAST_METHOD && frame["data"]["event"] == event {
                return frame["data"]["data"].clone();
            }
        }
    }

    /// Skip frames until a call to `method`.
    pub async fn next_call(&mut self, method: &str) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame["method"] == method {
                return frame;
            }
        }
    }

    pub fn reply(&self, value: Value) {
        let writer = self.writer.lock().unwrap();
        writer
            .as_ref()
            .expect("host never connected")
            .send(value.to_string())
            .unwrap();
    }

    /// Answer a call frame with `returnValue`.
    pub fn answer(&self, call: &Value, return_value: Value) {
        self.reply(json!({ "id": call["id"], "data": { "returnValue": return_value } }));
    }
}

/// A client socket on the host's listening port.
pub struct HostSocket {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl HostSocket {
    pub async fn connect(host_port: u16) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{host_port}/"))
            .await
            .unwrap();
        Self { ws }
    }

    pub async fn send(&mut self, value: Value) {
        self.ws
            .send(Message::Text(value.to_string().into()))
            .await
            .unwrap();
    }

    pub async fn recv(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .expect("no reply from host")
                .expect("host closed socket")
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    /// Send a request and wait for the reply.
    pub async fn request(&mut self, value: Value) -> Value {
        self.send(value).await;
        self.recv().await
    }
}

/// Spawns a fixed command and records the window arguments it was asked for.
pub struct RecordingLauncher {
    program: PathBuf,
    args: Vec<String>,
    launched: mpsc::UnboundedSender<Vec<String>>,
}

impl RecordingLauncher {
    pub fn new(
        program: &str,
        args: &[&str],
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<String>>) {
        let (launched, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                program: PathBuf::from(program),
                args: args.iter().map(|a| a.to_string()).collect(),
                launched,
            }),
            rx,
        )
    }

    /// A process that stays alive until killed.
    pub fn long_running() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<String>>) {
        Self::new("sleep", &["30"])
    }

    /// A process that writes to stderr and fails straight away.
    pub fn crashing() -> (Arc<Self>, mpsc::UnboundedReceiver<Vec<String>>) {
        Self::new("sh", &["-c", "echo boom >&2; exit 1"])
    }
}

impl Launcher for RecordingLauncher {
    fn launch(&self, args: Vec<String>) -> Result<Child> {
        let _ = self.launched.send(args);
        spawn_piped(&self.program, self.args.clone(), &std::env::temp_dir())
    }
}

#[derive(Default)]
pub struct RecordingTroubleshooter {
    pub opened: Mutex<Vec<String>>,
}

impl Troubleshooter for RecordingTroubleshooter {
    fn open(&self, url: &str) {
        self.opened.lock().unwrap().push(url.to_string());
    }
}

/// Value of `--<flag>=` in a window argument vector.
pub fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let prefix = format!("--{flag}=");
    args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
}
