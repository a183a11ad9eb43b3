//! Request/response correlation for calls into a window.
//!
//! Each outstanding call owns one entry keyed by its correlation id. An entry
//! is inserted before the request leaves, and is consumed exactly once: by a
//! response carrying the same id, by the caller giving up, or by the table
//! being closed when the connection drops.

use std::collections::HashMap;

use neubridge_proto::Response;
use serde_json::Value;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

use crate::error::{HostError, Result};

pub type CallReply = oneshot::Receiver<Result<Value>>;

/// Fresh correlation id. Never reused while the old one is pending since
/// each is a random v4 uuid.
pub fn new_call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct PendingCalls {
    /// `None` once closed.
    entries: Mutex<Option<HashMap<String, oneshot::Sender<Result<Value>>>>>,
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Some(HashMap::new())),
        }
    }

    /// Track a new call. Returns `None` if the table is already closed.
    pub async fn insert(&self, id: String) -> Option<CallReply> {
        let mut guard = self.entries.lock().await;
        let entries = guard.as_mut()?;
        let (tx, rx) = oneshot::channel();
        entries.insert(id, tx);
        Some(rx)
    }

    /// Abandon a call without resolving it.
    pub async fn remove(&self, id: &str) -> bool {
        let mut guard = self.entries.lock().await;
        guard
            .as_mut()
            .map(|entries| entries.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Settle the call with `id`. Unknown ids are ignored.
    pub async fn resolve(&self, id: &str, outcome: Result<Value>) -> bool {
        let sender = {
            let mut guard = self.entries.lock().await;
            guard.as_mut().and_then(|entries| entries.remove(id))
        };
        match sender {
            Some(tx) => {
                // The caller may have stopped waiting.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Route a response frame to its call. Returns whether it matched.
    pub async fn dispatch_response(&self, frame: &str) -> bool {
        let response: Response = match serde_json::from_str(frame) {
            Ok(r) => r,
            Err(e) => {
                debug!("ignoring non-response frame: {}", e);
                return false;
            }
        };
        let Some(id) = response.id().map(str::to_string) else {
            return false;
        };
        let outcome = response.into_outcome().map_err(HostError::Rpc);
        self.resolve(&id, outcome).await
    }

    /// Close the table and fail every pending call with `err()`.
    pub async fn reject_all(&self, err: impl Fn() -> HostError) -> usize {
        let drained = self.entries.lock().await.take();
        let Some(entries) = drained else {
            return 0;
        };
        let count = entries.len();
        for (_, tx) in entries {
            let _ = tx.send(Err(err()));
        }
        count
    }

    pub async fn len(&self) -> usize {
        self.entries
            .lock()
            .await
            .as_ref()
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub async fn is_closed(&self) -> bool {
        self.entries.lock().await.is_none()
    }
}
