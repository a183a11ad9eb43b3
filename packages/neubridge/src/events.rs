//! Fire-and-forget events pushed to windows.

use serde_json::Value;
use tracing::warn;

use crate::error::{HostError, Result};
use crate::registry::ConnectionRegistry;

/// Push `event` to the window registered as `name`.
pub async fn send_event(
    registry: &ConnectionRegistry,
    name: &str,
    event: &str,
    data: &Value,
) -> Result<()> {
    let conn = registry
        .get_by_name(name)
        .await
        .ok_or_else(|| HostError::NoConnection(name.to_string()))?;
    conn.send_event(event, data)
}

/// Push `event` to every registered window. Returns how many accepted it.
pub async fn broadcast(registry: &ConnectionRegistry, event: &str, data: &Value) -> usize {
    let mut delivered = 0;
    for conn in registry.connections().await {
        match conn.send_event(event, data) {
            Ok(()) => delivered += 1,
            Err(e) => warn!(name = %conn.name(), %event, "broadcast failed: {}", e),
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::transport::ChildLink;
    use neubridge_proto::{ChildToken, HostToken};
    use serde_json::json;

    #[tokio::test]
    async fn broadcast_reaches_every_live_window() {
        let registry = ConnectionRegistry::new();
        let mut peers = Vec::new();
        for name in ["a", "b", "c"] {
            let (link, peer) = ChildLink::in_memory();
            let conn = Connection::spawn(
                name.into(),
                HostToken::generate(),
                ChildToken::parse(&format!("s.{name}")).unwrap(),
                6000,
                link,
                None,
            );
            registry.register(conn).await;
            peers.push(peer);
        }
        // A closed link does not stop the others.
        peers.pop();

        let delivered = broadcast(&registry, "themeChanged", &json!({"dark": true})).await;
        assert_eq!(delivered, 2);
        for peer in &mut peers {
            let frame: Value = serde_json::from_str(&peer.sent.recv().await.unwrap()).unwrap();
            assert_eq!(frame["method"], "events.broadcast");
            assert_eq!(frame["data"]["event"], "themeChanged");
            assert_eq!(frame["data"]["data"]["dark"], true);
        }
    }

    #[tokio::test]
    async fn send_event_to_unknown_window() {
        let registry = ConnectionRegistry::new();
        let err = send_event(&registry, "ghost", "x", &Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No connection found by name: ghost");
    }
}
