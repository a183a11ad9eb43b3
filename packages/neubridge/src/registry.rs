//! Which windows are live, and which are expected.
//!
//! A name is *pending* from the moment the host decides to spawn a window
//! under it until an announce claims it. Only pending names may register.
//! Live connections are indexed both by logical name and by the host token
//! the window authenticates its requests with; the two indices always agree.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, oneshot};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{HostError, Result};

#[derive(Default)]
struct RegistryInner {
    by_name: HashMap<String, Arc<Connection>>,
    by_token: HashMap<String, Arc<Connection>>,
    pending: HashSet<String>,
    /// Names with an announce in flight: claimed, not yet registered.
    claimed: HashSet<String>,
    waiters: HashMap<String, Vec<oneshot::Sender<Arc<Connection>>>>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorize one future announce for `name`.
    pub async fn expect(&self, name: &str) {
        self.inner.write().await.pending.insert(name.to_string());
    }

    pub async fn is_pending(&self, name: &str) -> bool {
        self.inner.read().await.pending.contains(name)
    }

    /// Whether `name` is expected, mid-announce or live.
    pub async fn is_reserved(&self, name: &str) -> bool {
        let inner = self.inner.read().await;
        inner.pending.contains(name) || inner.claimed.contains(name) || inner.by_name.contains_key(name)
    }

    /// Consume the authorization for `name`. Returns false if none exists,
    /// so of two announces racing for one name only the first proceeds.
    pub async fn claim(&self, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.pending.remove(name) {
            inner.claimed.insert(name.to_string());
            true
        } else {
            false
        }
    }

    /// Hand a claimed name back after its announce failed to complete.
    pub async fn restore(&self, name: &str) {
        let mut inner = self.inner.write().await;
        if inner.claimed.remove(name) {
            inner.pending.insert(name.to_string());
        }
    }

    /// Stop expecting `name`. Anyone waiting on it is released with an error.
    pub async fn withdraw(&self, name: &str) {
        let mut inner = self.inner.write().await;
        inner.pending.remove(name);
        inner.claimed.remove(name);
        inner.waiters.remove(name);
    }

    /// Index a connection under its name and host token. An existing
    /// connection for the same name is replaced and shut down.
    pub async fn register(&self, conn: Arc<Connection>) {
        let replaced = {
            let mut inner = self.inner.write().await;
            let name = conn.name().to_string();
            inner.pending.remove(&name);
            inner.claimed.remove(&name);
            inner
                .by_token
                .insert(conn.host_token().as_str().to_string(), conn.clone());
            let replaced = inner.by_name.insert(name.clone(), conn.clone());
            if let Some(old) = &replaced {
                inner.by_token.remove(old.host_token().as_str());
            }
            for waiter in inner.waiters.remove(&name).unwrap_or_default() {
                let _ = waiter.send(conn.clone());
            }
            replaced
        };
        if let Some(old) = replaced {
            debug!(name = %old.name(), "replacing live connection");
            old.shutdown().await;
        }
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Arc<Connection>> {
        self.inner.read().await.by_name.get(name).cloned()
    }

    pub async fn get_by_token(&self, token: &str) -> Option<Arc<Connection>> {
        self.inner.read().await.by_token.get(token).cloned()
    }

    /// Remove `name` from both indices without closing it.
    pub async fn take(&self, name: &str) -> Option<Arc<Connection>> {
        let mut inner = self.inner.write().await;
        let conn = inner.by_name.remove(name)?;
        inner.by_token.remove(conn.host_token().as_str());
        Some(conn)
    }

    /// Remove and shut down the connection for `name`. No-op if none is live.
    pub async fn drop_connection(&self, name: &str) -> Option<Arc<Connection>> {
        let conn = self.take(name).await?;
        conn.shutdown().await;
        Some(conn)
    }

    /// Resolve once a connection for `name` is registered. Fails if `name`
    /// is neither live nor expected, or stops being expected.
    pub async fn await_connection(&self, name: &str) -> Result<Arc<Connection>> {
        let rx = {
            let mut inner = self.inner.write().await;
            if let Some(conn) = inner.by_name.get(name) {
                return Ok(conn.clone());
            }
            if !inner.pending.contains(name) && !inner.claimed.contains(name) {
                return Err(HostError::NoConnection(name.to_string()));
            }
            let (tx, rx) = oneshot::channel();
            inner.waiters.entry(name.to_string()).or_default().push(tx);
            rx
        };
        rx.await
            .map_err(|_| HostError::NoConnection(name.to_string()))
    }

    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.inner.read().await.by_name.values().cloned().collect()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn is_open(&self, name: &str) -> bool {
        self.inner.read().await.by_name.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_name.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
