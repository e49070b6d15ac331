//! # Error Types
//!
//! Comprehensive error handling for the messaging core.
//!
//! This module defines all error variants that can occur during channel
//! operations, from local precondition failures to validation rejections.
//!
//! ## Error Categories
//! - **Local precondition failures**: destroyed channel, oversized payload,
//!   rate limit exceeded — surfaced synchronously from `publish`/`broadcast`
//! - **Transport errors**: the peer endpoint is gone or the link is closed
//! - **Validation errors**: malformed or unauthorized inbound envelopes,
//!   dropped at the boundary before dispatch
//! - **Configuration errors**: invalid or unloadable settings
//!
//! Remote failures (no handler registered, handler failed) are *not* errors
//! in this module's sense: they travel back as a [`Reply`] with a negative
//! `ret` code, and callers branch on that code instead of catching an error.
//!
//! [`Reply`]: crate::core::envelope::Reply
//!
//! All errors implement `std::error::Error` for interoperability.

use crate::core::envelope::ReplyCode;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
/// Static strings are borrowed, avoiding heap allocations for common error cases.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Channel lifecycle errors
    pub const ERR_CHANNEL_DESTROYED: &str = "Channel has been destroyed";
    pub const ERR_RATE_LIMITED: &str = "Outbound rate limit exceeded";
    pub const ERR_OVERSIZED_PAYLOAD: &str = "Payload exceeds maximum message size";

    /// Transport errors
    pub const ERR_TRANSPORT_CLOSED: &str = "Transport closed or peer endpoint gone";

    /// Remote failure details carried in response envelopes
    pub const ERR_NO_HANDLER: &str = "No handler registered for command";
    pub const ERR_HANDLER_PANICKED: &str = "Handler panicked";
    pub const ERR_REQUEST_TIMEOUT: &str = "No response within the configured timeout";

    /// Validation errors
    pub const ERR_MISSING_COMMAND: &str = "Envelope carries no command name";
    pub const ERR_AMBIGUOUS_ENVELOPE: &str = "Envelope is neither request, response nor broadcast";
    pub const ERR_MALFORMED_ORIGIN: &str = "Declared origin is not a valid URL";
    pub const ERR_ORIGIN_MISMATCH: &str = "Declared origin does not match expected origin";
    pub const ERR_PEER_KEY_MISMATCH: &str = "Peer key does not match the paired key";
    pub const ERR_PEER_KEY_MISSING: &str = "Ready envelope carries no peer key";

    /// Hub errors
    pub const ERR_UNKNOWN_CLIENT: &str = "No channel registered for client";
    pub const ERR_CLIENT_LIMIT: &str = "Maximum number of tracked clients reached";
}

// ChannelError is the primary error type for all channel and hub operations
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel has been destroyed")]
    Destroyed,

    #[error("Payload too large: {size} bytes (max {max})")]
    OversizedPayload { size: usize, max: usize },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Transport closed")]
    TransportClosed,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Client limit reached: {0} clients tracked")]
    ClientLimitReached(usize),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ChannelError {
    /// Map a local precondition failure to the status code a caller would
    /// observe if the same failure had happened remotely. Errors with no
    /// wire-level counterpart return `None`.
    pub fn reply_code(&self) -> Option<ReplyCode> {
        match self {
            ChannelError::Destroyed => Some(ReplyCode::Destroyed),
            ChannelError::OversizedPayload { .. } => Some(ReplyCode::Oversized),
            ChannelError::RateLimited => Some(ReplyCode::RateLimited),
            ChannelError::Validation(ValidationError::OriginMismatch { .. }) => {
                Some(ReplyCode::UnauthorizedOrigin)
            }
            _ => None,
        }
    }
}

/// Failure of one of the pure validation predicates run against every
/// inbound envelope before dispatch. Envelopes failing validation are
/// dropped at the boundary and never reach a handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Envelope carries no command name")]
    MissingCommand,

    #[error("Envelope is neither request, response nor broadcast")]
    AmbiguousEnvelope,

    #[error("Payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Malformed origin: {0}")]
    MalformedOrigin(String),

    #[error("Origin mismatch: declared {declared:?}, expected {expected}")]
    OriginMismatch {
        declared: Option<String>,
        expected: String,
    },

    #[error("Peer key mismatch")]
    PeerKeyMismatch,

    #[error("Ready envelope carries no peer key")]
    PeerKeyMissing,
}

/// Type alias for Results using ChannelError
pub type Result<T> = std::result::Result<T, ChannelError>;
