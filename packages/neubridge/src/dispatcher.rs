//! Handler for every frame arriving on the host's listening socket.
//!
//! ```text
//!   frame ──parse──▶ announceSelf? ──yes──▶ validate ─▶ claim name ─▶ connect back
//!                        │                                            ─▶ register
//!                        no                                           ─▶ buntralinoRegisterParent
//!                        ▼
//!                  token known? ──no──▶ {error: "Invalid token"}
//!                        │
//!                       yes
//!                        ▼
//!                  buntralinoEvalResult? ──yes──▶ settle eval
//!                        │
//!                        no ──▶ method table ──▶ {id, data: {returnValue}} | {id, error}
//! ```

use std::sync::Arc;
use std::time::Duration;

use neubridge_proto::message::{
    EVAL_RESULT_METHOD, REGISTER_PARENT_EVENT, RegisterParent, error_reply, frame_token,
    invalid_token_reply, is_announce, parse_frame, result_reply,
};
use neubridge_proto::{Announce, HostToken, InboundRequest};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{HostError, Result};
use crate::methods::{MethodTable, RequestContext};
use crate::registry::ConnectionRegistry;
use crate::transport;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// What a frame turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Registered { name: String },
    InvalidToken,
    EvalCompleted { settled: bool },
    Handled { method: String },
    UnknownMethod { method: String },
    Ignored,
}

pub struct InboundDispatcher {
    registry: Arc<ConnectionRegistry>,
    methods: Arc<MethodTable>,
    host_port: u16,
    call_timeout: Option<Duration>,
    connect_timeout: Duration,
}

impl InboundDispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        methods: Arc<MethodTable>,
        host_port: u16,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            methods,
            host_port,
            call_timeout,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound on opening the socket back to an announcing window.
    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = limit;
        self
    }

    /// Handle one text frame. Replies go to `reply`, the socket the frame
    /// came in on. An error means the frame was rejected; the socket stays up.
    pub async fn dispatch(&self, text: &str, reply: &mpsc::Sender<String>) -> Result<DispatchOutcome> {
        let frame = parse_frame(text)?;

        if is_announce(&frame) {
            let conn = self.handle_announce(&frame).await?;
            return Ok(DispatchOutcome::Registered {
                name: conn.name().to_string(),
            });
        }

        // Authenticate before any typed decode, so a frame of any shape
        // with an unknown token still gets the explicit reply.
        let conn = match frame_token(&frame) {
            Some(token) => self.registry.get_by_token(token).await,
            None => None,
        };
        let Some(conn) = conn else {
            debug!(method = ?frame.get("method"), "request with unknown token");
            send_reply(reply, invalid_token_reply()).await;
            return Ok(DispatchOutcome::InvalidToken);
        };

        let request = InboundRequest::from_value(frame)?;
        let id = request.id.clone().unwrap_or(Value::Null);
        let method = match &request.method {
            None | Some(Value::Null) => {
                debug!(name = %conn.name(), "authenticated frame without a method");
                return Ok(DispatchOutcome::Ignored);
            }
            Some(Value::String(method)) => method.clone(),
            Some(other) => {
                let method = other.to_string();
                warn!(name = %conn.name(), %method, "non-string method");
                send_reply(reply, error_reply(&id, &format!("Unknown method: {method}"))).await;
                return Ok(DispatchOutcome::UnknownMethod { method });
            }
        };

        if method == EVAL_RESULT_METHOD {
            let settled = conn.evals().complete_value(request.data).await?;
            if !id.is_null() {
                send_reply(reply, result_reply(&id, Value::Bool(settled))).await;
            }
            return Ok(DispatchOutcome::EvalCompleted { settled });
        }

        let Some(handler) = self.methods.lookup(&method).await else {
            warn!(name = %conn.name(), %method, "unknown method");
            send_reply(reply, error_reply(&id, &format!("Unknown method: {method}"))).await;
            return Ok(DispatchOutcome::UnknownMethod { method });
        };

        debug!(name = %conn.name(), %method, "dispatching request");
        let ctx = RequestContext {
            connection: conn,
            id: id.clone(),
            method: method.clone(),
        };
        let reply = reply.clone();
        let data = request.data;
        // Off the read loop, so replies may come back out of order.
        tokio::spawn(async move {
            let response = match handler(ctx, data).await {
                Ok(value) => result_reply(&id, value),
                Err(e) => error_reply(&id, &format!("{e:#}")),
            };
            send_reply(&reply, response).await;
        });
        Ok(DispatchOutcome::Handled { method })
    }

    async fn handle_announce(&self, frame: &Value) -> Result<Arc<Connection>> {
        let announce = Announce::from_value(frame)?;
        let Announce { port, token, name } = announce;

        if !self.registry.claim(&name).await {
            return Err(HostError::UnauthorizedAnnounce(name));
        }

        let opened = tokio::time::timeout(
            self.connect_timeout,
            transport::open_child_link(port, &token),
        )
        .await
        .unwrap_or(Err(HostError::ConnectTimeout { port }));
        let link = match opened {
            Ok(link) => link,
            Err(e) => {
                self.registry.restore(&name).await;
                return Err(e);
            }
        };

        let host_token = HostToken::generate();
        let conn = Connection::spawn(
            name,
            host_token.clone(),
            token,
            port,
            link,
            self.call_timeout,
        );
        self.registry.register(conn.clone()).await;

        let notice = serde_json::to_value(RegisterParent {
            token: host_token,
            port: self.host_port,
        })?;
        conn.send_event(REGISTER_PARENT_EVENT, &notice)?;
        info!(name = %conn.name(), port, "window registered");
        Ok(conn)
    }
}

async fn send_reply(reply: &mpsc::Sender<String>, value: Value) {
    if reply.send(value.to_string()).await.is_err() {
        debug!("reply dropped: socket closed");
    }
}
