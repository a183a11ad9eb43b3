//! Host methods windows can call.
//!
//! Names are checked when registered: one or more dot-separated identifier
//! segments (`sayHello`, `app.files.list`), never a protocol name, never
//! registered twice.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use neubridge_proto::message::{ANNOUNCE_COMMAND, EVAL_RESULT_METHOD};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::connection::Connection;
use crate::error::{HostError, Result};

const RESERVED: &[&str] = &[ANNOUNCE_COMMAND, EVAL_RESULT_METHOD];

/// The caller of a host method.
#[derive(Clone)]
pub struct RequestContext {
    pub connection: Arc<Connection>,
    pub id: Value,
    pub method: String,
}

impl RequestContext {
    /// Logical name of the calling window.
    pub fn window(&self) -> &str {
        self.connection.name()
    }
}

pub type Handler =
    Arc<dyn Fn(RequestContext, Value) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Box a closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(
        move |ctx: RequestContext, data: Value| -> BoxFuture<'static, anyhow::Result<Value>> {
            Box::pin(f(ctx, data))
        },
    )
}

pub fn validate_method_name(name: &str) -> Result<()> {
    let well_formed = !name.is_empty()
        && name.split('.').all(|segment| {
            let mut chars = segment.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if !well_formed || RESERVED.contains(&name) {
        return Err(HostError::InvalidMethod(name.to_string()));
    }
    Ok(())
}

#[derive(Default)]
pub struct MethodTable {
    handlers: RwLock<HashMap<String, Handler>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_handler(&self, name: &str, handler: Handler) -> Result<()> {
        validate_method_name(name)?;
        let mut handlers = self.handlers.write().await;
        if handlers.contains_key(name) {
            return Err(HostError::MethodAlreadyRegistered(name.to_string()));
        }
        handlers.insert(name.to_string(), handler);
        Ok(())
    }

    pub async fn register<F, Fut>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register_handler(name, handler(f)).await
    }

    /// Register a handler whose payload and result are serde types. A payload
    /// that does not deserialize fails the request.
    pub async fn register_typed<P, R, F, Fut>(&self, name: &str, f: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.register(name, move |ctx, data| {
            let f = f.clone();
            async move {
                let payload: P = serde_json::from_value(data)
                    .map_err(|e| anyhow::anyhow!("invalid payload for {}: {}", ctx.method, e))?;
                let result = f(ctx, payload).await?;
                Ok(serde_json::to_value(result)?)
            }
        })
        .await
    }

    /// Register several handlers. Every name is checked before any is added.
    pub async fn register_map(
        &self,
        entries: impl IntoIterator<Item = (String, Handler)>,
    ) -> Result<()> {
        let entries: Vec<(String, Handler)> = entries.into_iter().collect();
        let mut handlers = self.handlers.write().await;
        let mut seen = std::collections::HashSet::new();
        for (name, _) in &entries {
            validate_method_name(name)?;
            if handlers.contains_key(name) || !seen.insert(name.clone()) {
                return Err(HostError::MethodAlreadyRegistered(name.clone()));
            }
        }
        for (name, handler) in entries {
            handlers.insert(name, handler);
        }
        Ok(())
    }

    pub async fn lookup(&self, name: &str) -> Option<Handler> {
        self.handlers.read().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
