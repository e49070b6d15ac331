//! # Core Protocol Model
//!
//! The envelope shape and wire encodings shared by every component.

pub mod envelope;
pub mod serialization;

pub use envelope::{EnvelopeKind, MessageEnvelope, Reply, ReplyCode, RequestId, READY_COMMAND};
pub use serialization::{MultiFormat, SerializationFormat};
