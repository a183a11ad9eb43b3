//! Typed convenience calls for a window addressed by logical name.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{HostError, Result};
use crate::host::Host;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

/// Window geometry as reported by `window.getSize`. Every field is optional
/// so a partial value can be passed to [`Window::set_size`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSize {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resizable: Option<bool>,
}

impl WindowSize {
    /// `other`'s fields win where set.
    pub fn merged(self, other: WindowSize) -> WindowSize {
        WindowSize {
            width: other.width.or(self.width),
            height: other.height.or(self.height),
            min_width: other.min_width.or(self.min_width),
            min_height: other.min_height.or(self.min_height),
            max_width: other.max_width.or(self.max_width),
            max_height: other.max_height.or(self.max_height),
            resizable: other.resizable.or(self.resizable),
        }
    }
}

/// Handle to one window. Holds only the name, so it stays valid across
/// navigate and reload.
#[derive(Clone)]
pub struct Window {
    host: Host,
    name: String,
}

impl Host {
    pub fn window(&self, name: impl Into<String>) -> Window {
        Window {
            host: self.clone(),
            name: name.into(),
        }
    }
}

impl Window {
    pub fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, method: &str, data: Value) -> Result<Value> {
        self.host.call(&self.name, method, data).await
    }

    async fn call_typed<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        data: Value,
    ) -> Result<T> {
        let value = self.call(method, data).await?;
        serde_json::from_value(value).map_err(HostError::from)
    }

    pub async fn is_open(&self) -> bool {
        self.host.is_connection_open(&self.name).await
    }

    /// Ask the window's application to exit.
    pub async fn exit(&self) -> Result<()> {
        self.call("app.exit", json!({})).await.map(|_| ())
    }

    pub async fn close(&self) -> Result<()> {
        self.exit().await
    }

    pub async fn show(&self) -> Result<()> {
        self.call("window.show", json!({})).await.map(|_| ())
    }

    pub async fn hide(&self) -> Result<()> {
        self.call("window.hide", json!({})).await.map(|_| ())
    }

    pub async fn focus(&self) -> Result<()> {
        self.call("window.focus", json!({})).await.map(|_| ())
    }

    pub async fn center(&self) -> Result<()> {
        self.call("window.center", json!({})).await.map(|_| ())
    }

    pub async fn get_title(&self) -> Result<String> {
        self.call_typed("window.getTitle", json!({})).await
    }

    pub async fn set_title(&self, title: &str) -> Result<()> {
        self.call("window.setTitle", json!({ "title": title }))
            .await
            .map(|_| ())
    }

    pub async fn get_position(&self) -> Result<Position> {
        self.call_typed("window.getPosition", json!({})).await
    }

    pub async fn move_to(&self, x: i64, y: i64) -> Result<()> {
        let position = serde_json::to_value(Position { x, y })?;
        self.call("window.move", position).await.map(|_| ())
    }

    pub async fn get_size(&self) -> Result<WindowSize> {
        self.call_typed("window.getSize", json!({})).await
    }

    /// Set the fields present in `size`, keeping the rest as they are.
    pub async fn set_size(&self, size: WindowSize) -> Result<()> {
        let current = self.get_size().await?;
        let merged = serde_json::to_value(current.merged(size))?;
        self.call("window.setSize", merged).await.map(|_| ())
    }

    pub async fn set_always_on_top(&self, on_top: bool) -> Result<()> {
        self.call("window.setAlwaysOnTop", json!({ "onTop": on_top }))
            .await
            .map(|_| ())
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.host.navigate(&self.name, url).await
    }

    pub async fn reload(&self) -> Result<()> {
        self.host.reload(&self.name).await
    }

    pub async fn eval_js(&self, js: &str) -> Result<Value> {
        self.host.eval_js(&self.name, js).await
    }

    pub async fn send_event(&self, event: &str, data: Value) -> Result<()> {
        self.host.send_event(&self.name, event, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_uses_camel_case_and_skips_unset() {
        let size = WindowSize {
            width: Some(800),
            min_height: Some(200),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&size).unwrap(),
            json!({"width": 800, "minHeight": 200})
        );
    }

    #[test]
    fn merge_prefers_new_fields() {
        let current: WindowSize = serde_json::from_value(json!({
            "width": 800, "height": 600, "resizable": true
        }))
        .unwrap();
        let merged = current.merged(WindowSize {
            height: Some(400),
            ..Default::default()
        });
        assert_eq!(merged.width, Some(800));
        assert_eq!(merged.height, Some(400));
        assert_eq!(merged.resizable, Some(true));
    }

    #[test]
    fn position_shape() {
        assert_eq!(
            serde_json::to_value(Position { x: 5, y: -3 }).unwrap(),
            json!({"x": 5, "y": -3})
        );
    }

    #[tokio::test]
    async fn missing_window_reports_name() {
        let host = Host::builder().start().await.unwrap();
        let err = host.window("nowhere").show().await.unwrap_err();
        assert_eq!(err.to_string(), "No connection found by name: nowhere");
        assert!(!host.window("nowhere").is_open().await);
        host.shutdown().await;
    }
}
