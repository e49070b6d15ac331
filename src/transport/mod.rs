//! # Transport Abstraction
//!
//! The core never touches host APIs directly: a transport adapter binds a
//! channel (or hub) to whatever actually moves envelopes between peers.
//! Sends are fire-and-forget and may fail when the peer endpoint is gone;
//! inbound envelopes are pushed into the protocol engine by the adapter
//! calling `Channel::handle_incoming` (or `Hub::handle_incoming` with the
//! sender's client identity).

use crate::core::envelope::MessageEnvelope;
use crate::error::Result;

pub mod local;

pub use local::{LocalEndpoint, LocalHubTransport};

/// Outbound half of a point-to-point transport binding.
pub trait Transport: Send + Sync {
    /// Deliver one envelope to the peer. Fire-and-forget; an error means
    /// the peer endpoint is gone.
    fn send(&self, envelope: MessageEnvelope) -> Result<()>;
}

/// Outbound half of a multi-client transport binding, used by the hub to
/// reach a specific client behind one shared physical endpoint.
pub trait HubTransport: Send + Sync {
    /// Deliver one envelope to the identified client.
    fn send_to(&self, client_id: &str, envelope: MessageEnvelope) -> Result<()>;
}
