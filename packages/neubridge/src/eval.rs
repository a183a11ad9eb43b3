//! Script evaluation inside a window.
//!
//! Unlike calls, an eval is pushed as a `buntralinoEval` event and its
//! outcome comes back later as a separate `buntralinoEvalResult` request on
//! the host's socket. Each connection owns its own table, so only the window
//! an eval was sent to can complete it.

use neubridge_proto::message::EvalResult;
use serde_json::Value;

use crate::error::HostError;
use crate::rpc::{CallReply, PendingCalls, new_call_id};

#[derive(Default)]
pub struct EvalBridge {
    pending: PendingCalls,
}

impl EvalBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a request id and its completion. `None` once closed.
    pub async fn begin(&self) -> Option<(String, CallReply)> {
        let request_id = new_call_id();
        let reply = self.pending.insert(request_id.clone()).await?;
        Some((request_id, reply))
    }

    pub async fn abandon(&self, request_id: &str) {
        self.pending.remove(request_id).await;
    }

    /// Settle an eval from the window's report. Unknown ids are ignored.
    pub async fn complete(&self, result: EvalResult) -> bool {
        let request_id = result.request_id.clone();
        let outcome = result.into_outcome().map_err(HostError::Rpc);
        self.pending.resolve(&request_id, outcome).await
    }

    pub async fn complete_value(&self, data: Value) -> Result<bool, serde_json::Error> {
        let result: EvalResult = serde_json::from_value(data)?;
        Ok(self.complete(result).await)
    }

    pub async fn reject_all(&self, name: &str) -> usize {
        self.pending
            .reject_all(|| HostError::ConnectionDropped(name.to_string()))
            .await
    }

    pub async fn pending(&self) -> usize {
        self.pending.len().await
    }
}
