//! The host facade: one `create` call, one fully negotiated window.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use neubridge_proto::WindowOptions;
use neubridge_proto::args::{USE_SAVED_STATE_KEY, control_args, window_option_args};
use neubridge_proto::message::{NAVIGATE_EVENT, Navigate, RELOAD_EVENT};
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::HostConfig;
use crate::connection::Connection;
use crate::dispatcher::InboundDispatcher;
use crate::error::{HostError, Result};
use crate::events;
use crate::launcher::{BinaryLauncher, Launcher};
use crate::lifecycle::{
    LifecycleEvent, Troubleshooter, XdgOpen, create_lifecycle_broadcast, is_abnormal_exit,
    should_offer_troubleshooting,
};
use crate::methods::{Handler, MethodTable, RequestContext};
use crate::registry::ConnectionRegistry;
use crate::server;

const WINDOW_ID_LEN: usize = 7;
const WINDOW_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Random 7-character base36 id returned by [`Host::create`].
pub fn window_id() -> String {
    let mut rng = rand::rng();
    (0..WINDOW_ID_LEN)
        .map(|_| WINDOW_ID_ALPHABET[rng.random_range(0..WINDOW_ID_ALPHABET.len())] as char)
        .collect()
}

pub struct HostBuilder {
    config: HostConfig,
    launcher: Option<Arc<dyn Launcher>>,
    troubleshooter: Option<Arc<dyn Troubleshooter>>,
}

impl HostBuilder {
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn troubleshooter(mut self, troubleshooter: Arc<dyn Troubleshooter>) -> Self {
        self.troubleshooter = Some(troubleshooter);
        self
    }

    /// Bind the listening socket and start serving.
    pub async fn start(self) -> Result<Host> {
        let config = self.config;
        let listener = server::bind(&config.host, config.port).await?;
        let port = listener.local_addr()?.port();

        let registry = Arc::new(ConnectionRegistry::new());
        let methods = Arc::new(MethodTable::new());
        let dispatcher = Arc::new(InboundDispatcher::new(
            registry.clone(),
            methods.clone(),
            port,
            config.call_timeout,
        )
        .with_connect_timeout(config.connect_timeout));
        let cancel = CancellationToken::new();
        let server = server::serve(listener, dispatcher, cancel.clone());

        let launcher = self.launcher.unwrap_or_else(|| {
            Arc::new(BinaryLauncher::new(config.launcher.clone())) as Arc<dyn Launcher>
        });
        let troubleshooter = self
            .troubleshooter
            .unwrap_or_else(|| Arc::new(XdgOpen) as Arc<dyn Troubleshooter>);

        Ok(Host {
            inner: Arc::new(HostInner {
                config,
                port,
                registry,
                methods,
                launcher,
                troubleshooter,
                lifecycle: create_lifecycle_broadcast(),
                running: Mutex::new(HashSet::new()),
                cancel,
                server: Mutex::new(Some(server)),
            }),
        })
    }
}

struct HostInner {
    config: HostConfig,
    port: u16,
    registry: Arc<ConnectionRegistry>,
    methods: Arc<MethodTable>,
    launcher: Arc<dyn Launcher>,
    troubleshooter: Arc<dyn Troubleshooter>,
    lifecycle: broadcast::Sender<LifecycleEvent>,
    /// Names whose window process has not exited yet.
    running: Mutex<HashSet<String>>,
    cancel: CancellationToken,
    server: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap to clone; all clones share one server and registry.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    pub fn builder() -> HostBuilder {
        HostBuilder {
            config: HostConfig::default(),
            launcher: None,
            troubleshooter: None,
        }
    }

    /// Port windows connect back to.
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.inner.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.inner.lifecycle.subscribe()
    }

    /// Spawn a window showing `url` and wait until it has registered.
    ///
    /// Returns the window's random id. Its logical name is `options.name`
    /// when given, otherwise the id. Fails if the name belongs to a window
    /// whose process is still running, if the launch fails, or if the
    /// process exits before announcing itself.
    pub async fn create(&self, url: &str, options: WindowOptions) -> Result<String> {
        let id = window_id();
        let name = options
            .logical_name()
            .map(str::to_string)
            .unwrap_or_else(|| id.clone());
        let options = options.over(WindowOptions::new().with(USE_SAVED_STATE_KEY, false));

        let mut args = control_args(self.inner.port, &name, url);
        args.extend(window_option_args(&options));

        let registry = &self.inner.registry;
        {
            let mut running = self.inner.running.lock().await;
            if running.contains(&name) || registry.is_reserved(&name).await {
                return Err(HostError::NameInUse(name));
            }
            running.insert(name.clone());
        }
        registry.expect(&name).await;
        let child = match self.inner.launcher.launch(args) {
            Ok(child) => child,
            Err(e) => {
                registry.withdraw(&name).await;
                self.inner.running.lock().await.remove(&name);
                return Err(e);
            }
        };
        info!(%name, %id, %url, "window process started");
        let _ = self.inner.lifecycle.send(LifecycleEvent::Opened { name: name.clone() });

        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(self.clone().watch_exit(name.clone(), child, exit_tx));

        tokio::select! {
            biased;
            exit = exit_rx => Err(HostError::ChildExited {
                name: name.clone(),
                exit_code: exit.unwrap_or(None),
            }),
            conn = registry.await_connection(&name) => conn.map(|_| id),
        }
    }

    async fn watch_exit(self, name: String, mut child: Child, exit_tx: oneshot::Sender<Option<i32>>) {
        let opened_at = Instant::now();
        // Held open for the life of the process.
        let _stdin = child.stdin.take();

        if let Some(stdout) = child.stdout.take() {
            let name = name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(%name, "{}", line);
                }
            });
        }
        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut captured = String::new();
                let _ = stderr.read_to_string(&mut captured).await;
                captured
            })
        });

        let cancel = self.inner.cancel.clone();
        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                child.wait().await
            }
        };
        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!(%name, "failed to wait for window process: {}", e);
                None
            }
        };
        let elapsed = opened_at.elapsed();
        let stderr = match stderr_task {
            Some(task) => tokio::time::timeout(STDERR_DRAIN_TIMEOUT, task)
                .await
                .ok()
                .and_then(|joined| joined.ok())
                .unwrap_or_default(),
            None => String::new(),
        };

        let _ = exit_tx.send(exit_code);
        self.inner.registry.drop_connection(&name).await;
        self.inner.registry.withdraw(&name).await;
        self.inner.running.lock().await.remove(&name);
        info!(%name, ?exit_code, "window exited");
        let _ = self.inner.lifecycle.send(LifecycleEvent::Closed {
            name: name.clone(),
            exit_code,
        });

        if !is_abnormal_exit(exit_code) || cancel.is_cancelled() {
            return;
        }
        error!(%name, ?exit_code, "window exited abnormally");
        let stderr = stderr.trim_end();
        if !stderr.is_empty() {
            error!(%name, "{}", stderr);
        }
        let lifecycle = &self.inner.config.lifecycle;
        if lifecycle.open_troubleshooter
            && should_offer_troubleshooting(
                std::env::consts::OS,
                exit_code,
                elapsed,
                lifecycle.crash_grace,
            )
        {
            self.inner.troubleshooter.open(&lifecycle.troubleshoot_url);
        }
    }

    /// Load `url` in a window. The window re-announces under the same name.
    pub async fn navigate(&self, name: &str, url: &str) -> Result<()> {
        let data = serde_json::to_value(Navigate {
            url: url.to_string(),
        })?;
        self.reregister(name, NAVIGATE_EVENT, data).await
    }

    /// Reload a window. The window re-announces under the same name.
    pub async fn reload(&self, name: &str) -> Result<()> {
        self.reregister(name, RELOAD_EVENT, json!({})).await
    }

    async fn reregister(&self, name: &str, event: &str, data: Value) -> Result<()> {
        let registry = &self.inner.registry;
        let conn = registry
            .take(name)
            .await
            .ok_or_else(|| HostError::NoConnection(name.to_string()))?;
        registry.expect(name).await;
        let sent = conn.send_event(event, &data);
        conn.shutdown().await;
        if let Err(e) = sent {
            registry.withdraw(name).await;
            return Err(e);
        }
        debug!(%name, %event, "waiting for window to re-register");
        registry.await_connection(name).await?;
        Ok(())
    }

    pub async fn eval_js(&self, name: &str, js: &str) -> Result<Value> {
        self.connection(name).await?.eval_js(js).await
    }

    /// Call a method inside the window registered as `name`.
    pub async fn call(&self, name: &str, method: &str, data: Value) -> Result<Value> {
        self.connection(name).await?.call(method, data).await
    }

    pub async fn send_event(&self, name: &str, event: &str, data: Value) -> Result<()> {
        events::send_event(&self.inner.registry, name, event, &data).await
    }

    /// Push an event to every live window.
    pub async fn broadcast(&self, event: &str, data: Value) -> usize {
        events::broadcast(&self.inner.registry, event, &data).await
    }

    pub async fn is_connection_open(&self, name: &str) -> bool {
        self.inner.registry.is_open(name).await
    }

    pub async fn register_method<F, Fut>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(RequestContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.inner.methods.register(name, f).await
    }

    pub async fn register_typed<P, R, F, Fut>(&self, name: &str, f: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        self.inner.methods.register_typed(name, f).await
    }

    pub async fn register_method_map(
        &self,
        entries: impl IntoIterator<Item = (String, Handler)>,
    ) -> Result<()> {
        self.inner.methods.register_map(entries).await
    }

    /// Stop serving, drop every connection and kill every window process.
    pub async fn shutdown(&self) {
        info!("shutting down host");
        self.inner.cancel.cancel();
        for name in self.inner.registry.names().await {
            self.inner.registry.drop_connection(&name).await;
        }
        let server = self.inner.server.lock().await.take();
        if let Some(server) = server {
            let _ = server.await;
        }
    }

    pub(crate) async fn connection(&self, name: &str) -> Result<Arc<Connection>> {
        self.inner
            .registry
            .get_by_name(name)
            .await
            .ok_or_else(|| HostError::NoConnection(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_ids_are_seven_base36_chars() {
        for _ in 0..100 {
            let id = window_id();
            assert_eq!(id.len(), 7);
            assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        }
    }

    #[test]
    fn window_ids_differ() {
        assert_ne!(window_id(), window_id());
    }

    #[tokio::test]
    async fn start_binds_a_free_port() {
        let host = Host::builder().start().await.unwrap();
        assert_ne!(host.port(), 0);
        host.shutdown().await;
    }

    #[tokio::test]
    async fn calls_to_unknown_windows_fail() {
        let host = Host::builder().start().await.unwrap();
        let err = host.call("ghost", "window.show", Value::Null).await.unwrap_err();
        assert_eq!(err.to_string(), "No connection found by name: ghost");
        assert!(matches!(
            host.navigate("ghost", "https://example.com").await,
            Err(HostError::NoConnection(_))
        ));
        assert!(matches!(
            host.eval_js("ghost", "1").await,
            Err(HostError::NoConnection(_))
        ));
        assert!(!host.is_connection_open("ghost").await);
        host.shutdown().await;
    }
}
