//! # message-channel
//!
//! Reliable request/response messaging over fire-and-forget transports.
//!
//! A bare asynchronous message-passing transport (a page and an embedded
//! frame, a page and a shared worker, two halves of an in-process bridge)
//! delivers envelopes at most once and tells the sender nothing. This
//! crate layers a protocol engine on top: callers [`publish`] a named
//! command with a payload and receive a correlated response or a typed
//! failure, exactly once, within a bounded time.
//!
//! [`publish`]: protocol::channel::Channel::publish
//!
//! ## Components
//! - [`protocol::channel::Channel`] — one logical conversation with one
//!   peer: correlation, readiness queueing, rate limiting, timeouts
//! - [`hub::Hub`] — many channels behind one shared listener: routing by
//!   client identity, broadcast fan-out, stale-client cleanup
//! - [`core::envelope::MessageEnvelope`] — the wire shape
//! - [`transport`] — the adapter seam binding the engine to a host
//!
//! ## Example
//! ```rust
//! use message_channel::config::ChannelConfig;
//! use message_channel::protocol::channel::Channel;
//! use message_channel::transport::LocalEndpoint;
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> message_channel::error::Result<()> {
//!     let (host_end, frame_end) = LocalEndpoint::pair();
//!     let host = Channel::new(ChannelConfig::default(), host_end.clone());
//!     let frame = Channel::new(ChannelConfig::default(), frame_end.clone());
//!     host_end.pump(host.clone());
//!     frame_end.pump(frame.clone());
//!
//!     frame.subscribe("greet", |payload| async move {
//!         Ok(json!({ "greeting": format!("hello, {}", payload["name"]) }))
//!     })?;
//!
//!     host.signal_ready()?;
//!     frame.signal_ready()?;
//!
//!     let reply = host.publish("greet", json!({ "name": "world" })).await?;
//!     assert!(reply.is_ok());
//!     Ok(())
//! }
//! ```
//!
//! ## Guarantees
//! - A pending request settles exactly once, by whichever of {matching
//!   response, timeout, destroy} happens first
//! - Envelopes queued before readiness are flushed in enqueue order
//! - Remote failures surface through the reply's `ret` code, never as a
//!   raised error; only local precondition violations return `Err`
//! - Nothing in the core is fatal to the process: every failure is scoped
//!   to one request or one channel

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod core;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod transport;
pub mod utils;

/// Convenience re-exports of the types most integrations need.
pub mod prelude {
    pub use crate::config::{ChannelConfig, HubConfig, ProtocolConfig, RoutingMode};
    pub use crate::core::envelope::{
        EnvelopeKind, MessageEnvelope, Reply, ReplyCode, RequestId,
    };
    pub use crate::error::{ChannelError, Result, ValidationError};
    pub use crate::hub::{ClientMeta, Hub};
    pub use crate::protocol::channel::Channel;
    pub use crate::protocol::dispatcher::{Handler, HandlerResult};
    pub use crate::transport::{HubTransport, LocalEndpoint, LocalHubTransport, Transport};
    pub use crate::utils::events::{Event, EventEmitter, EventKind};
}
