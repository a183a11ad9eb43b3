//! Spawn Neutralino window processes and talk to them over WebSocket RPC.
//!
//! A [`Host`] listens on a local port. Each window it creates is started
//! with that port and its logical name, connects back to announce itself,
//! and from then on both sides can call methods and push events. Windows
//! authenticate to the host with a host-issued token; the host connects to
//! each window with the window's own token.

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod eval;
pub mod events;
pub mod host;
pub mod launcher;
pub mod lifecycle;
pub mod methods;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod transport;
pub mod window;

#[cfg(test)]
mod test_helpers;

pub use config::HostConfig;
pub use connection::Connection;
pub use error::{HostError, Result};
pub use host::{Host, HostBuilder};
pub use launcher::{BinaryLauncher, Launcher};
pub use lifecycle::{LifecycleEvent, Troubleshooter};
pub use methods::{Handler, RequestContext, handler};
pub use neubridge_proto::WindowOptions;
pub use registry::ConnectionRegistry;
pub use window::{Position, Window, WindowSize};
