use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use neubridge_proto::message::{EVAL_EVENT, EVENTS_BROADCAST_METHOD, EvalDispatch, EventEnvelope};
use neubridge_proto::{ChildToken, HostToken, OutboundRequest};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{HostError, Result};
use crate::eval::EvalBridge;
use crate::rpc::{CallReply, PendingCalls, new_call_id};
use crate::transport::ChildLink;

/// One live, registered window.
pub struct Connection {
    name: String,
    host_token: HostToken,
    child_token: ChildToken,
    port: u16,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
    calls: PendingCalls,
    evals: EvalBridge,
    call_timeout: Option<Duration>,
    connected_at: DateTime<Utc>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("port", &self.port)
            .field("connected_at", &self.connected_at)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap a link and start routing the window's responses to pending calls.
    pub fn spawn(
        name: String,
        host_token: HostToken,
        child_token: ChildToken,
        port: u16,
        link: ChildLink,
        call_timeout: Option<Duration>,
    ) -> Arc<Self> {
        let ChildLink {
            outbound,
            mut inbound,
            cancel,
        } = link;

        let conn = Arc::new(Self {
            name,
            host_token,
            child_token,
            port,
            outbound,
            cancel,
            calls: PendingCalls::new(),
            evals: EvalBridge::new(),
            call_timeout,
            connected_at: Utc::now(),
        });

        let reader = conn.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                reader.handle_incoming(&frame).await;
            }
            debug!(name = %reader.name, "window link ended");
            reader.reject_pending().await;
        });

        conn
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host_token(&self) -> &HostToken {
        &self.host_token
    }

    pub fn child_token(&self) -> &ChildToken {
        &self.child_token
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.outbound.is_closed()
    }

    /// Call `method` in the window and wait for its response.
    pub async fn call(&self, method: &str, data: Value) -> Result<Value> {
        let id = new_call_id();
        let reply = self
            .calls
            .insert(id.clone())
            .await
            .ok_or_else(|| self.dropped())?;

        if let Err(e) = self.send_request(&id, method, &data) {
            self.calls.remove(&id).await;
            return Err(e);
        }
        debug!(name = %self.name, %method, %id, "call sent");

        match self.wait(reply, method).await {
            Err(HostError::RpcTimeout { method }) => {
                self.calls.remove(&id).await;
                Err(HostError::RpcTimeout { method })
            }
            other => other,
        }
    }

    /// Send `method` without waiting for a response.
    pub fn notify(&self, method: &str, data: Value) -> Result<()> {
        self.send_request(&new_call_id(), method, &data)
    }

    /// Push an event to the window's `events.broadcast` listeners.
    pub fn send_event(&self, event: &str, data: &Value) -> Result<()> {
        let envelope = serde_json::to_value(EventEnvelope { event, data })?;
        self.notify(EVENTS_BROADCAST_METHOD, envelope)
    }

    /// Run `js` in the window and wait for the reported outcome.
    pub async fn eval_js(&self, js: &str) -> Result<Value> {
        let (request_id, reply) = self.evals.begin().await.ok_or_else(|| self.dropped())?;
        let dispatch = serde_json::to_value(EvalDispatch {
            js: js.to_string(),
            request_id: request_id.clone(),
        })?;
        if let Err(e) = self.send_event(EVAL_EVENT, &dispatch) {
            self.evals.abandon(&request_id).await;
            return Err(e);
        }
        match self.wait(reply, EVAL_EVENT).await {
            Err(HostError::RpcTimeout { method }) => {
                self.evals.abandon(&request_id).await;
                Err(HostError::RpcTimeout { method })
            }
            other => other,
        }
    }

    pub(crate) fn evals(&self) -> &EvalBridge {
        &self.evals
    }

    /// Route one frame from the window's socket.
    pub async fn handle_incoming(&self, frame: &str) {
        if !self.calls.dispatch_response(frame).await {
            debug!(name = %self.name, "unmatched frame from window");
        }
    }

    /// Fail every outstanding call and eval on this connection.
    pub async fn reject_pending(&self) {
        let calls = self
            .calls
            .reject_all(|| HostError::ConnectionDropped(self.name.clone()))
            .await;
        let evals = self.evals.reject_all(&self.name).await;
        if calls + evals > 0 {
            warn!(
                name = %self.name,
                calls, evals, "rejected pending requests on dropped connection"
            );
        }
    }

    /// Reject pending work and close the socket after flushing queued frames.
    pub async fn shutdown(&self) {
        self.reject_pending().await;
        self.cancel.cancel();
    }

    pub async fn pending_calls(&self) -> usize {
        self.calls.len().await
    }

    fn send_request(&self, id: &str, method: &str, data: &Value) -> Result<()> {
        let frame = serde_json::to_string(&OutboundRequest {
            id,
            method,
            data,
            access_token: self.child_token.as_str(),
        })?;
        self.outbound.send(frame).map_err(|_| self.dropped())
    }

    async fn wait(&self, reply: CallReply, method: &str) -> Result<Value> {
        let outcome = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, reply).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(HostError::RpcTimeout {
                        method: method.to_string(),
                    });
                }
            },
            None => reply.await,
        };
        outcome.map_err(|_| self.dropped())?
    }

    fn dropped(&self) -> HostError {
        HostError::ConnectionDropped(self.name.clone())
    }
}
