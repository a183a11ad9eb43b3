//! Wire protocol primitives for brokering Neutralino window processes.
//!
//! Nothing in this crate performs I/O. It defines:
//! - the JSON messages exchanged with a window process (`message`)
//! - the two token spaces, host-issued and child-issued (`token`)
//! - the OS argument vector a window process is spawned with (`args`)

pub mod args;
pub mod error;
pub mod message;
pub mod token;

pub use args::WindowOptions;
pub use error::ProtoError;
pub use message::{Announce, InboundRequest, OutboundRequest, Response};
pub use token::{ChildToken, HostToken};
