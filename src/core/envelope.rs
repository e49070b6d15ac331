//! # Message Envelope
//!
//! The wire shape shared by every component: one envelope is one unit
//! exchanged over the transport, and it is exactly one of
//!
//! - a **request** — `cmd` and `request_id` set, `ret` absent
//! - a **response** — `ret` and `request_id` set, `cmd` absent
//! - a **broadcast** — `cmd` set, no `request_id`, no response expected
//! - a **ready** marker — the readiness handshake, carrying the peer key
//!
//! Payloads are arbitrary structured data (`serde_json::Value`). Ownership
//! of the payload moves into the envelope on send, so resources are never
//! duplicated on the sending side.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Correlation identifier linking a response to its originating request.
/// Unique within a channel's lifetime.
pub type RequestId = u64;

/// Reserved command name used by the readiness handshake.
pub const READY_COMMAND: &str = "__ready__";

/// Result status vocabulary carried in the `ret` field of response
/// envelopes and surfaced to callers through [`Reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyCode {
    /// Success
    Ok,
    /// No response arrived within the configured deadline
    Timeout,
    /// The peer has no handler registered for the command
    NoHandler,
    /// The channel was destroyed while the request was in flight
    Destroyed,
    /// The remote handler failed or panicked
    HandlerError,
    /// The outbound rate limit was exceeded
    RateLimited,
    /// The payload exceeded the maximum message size
    Oversized,
    /// The declared origin failed the identity check
    UnauthorizedOrigin,
}

impl ReplyCode {
    /// Numeric wire representation: `0` success, negative codes per failure kind.
    pub fn as_i32(self) -> i32 {
        match self {
            ReplyCode::Ok => 0,
            ReplyCode::Timeout => -1,
            ReplyCode::NoHandler => -2,
            ReplyCode::Destroyed => -3,
            ReplyCode::HandlerError => -4,
            ReplyCode::RateLimited => -5,
            ReplyCode::Oversized => -6,
            ReplyCode::UnauthorizedOrigin => -7,
        }
    }

    /// Decode a wire status. Unknown negative codes fall back to
    /// `HandlerError` rather than failing the whole envelope.
    pub fn from_i32(ret: i32) -> Self {
        match ret {
            0 => ReplyCode::Ok,
            -1 => ReplyCode::Timeout,
            -2 => ReplyCode::NoHandler,
            -3 => ReplyCode::Destroyed,
            -5 => ReplyCode::RateLimited,
            -6 => ReplyCode::Oversized,
            -7 => ReplyCode::UnauthorizedOrigin,
            _ => ReplyCode::HandlerError,
        }
    }
}

/// Classification of an envelope per the protocol invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    Request,
    Response,
    Broadcast,
    Ready,
}

/// One message unit exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Correlation id; present on requests and responses, absent on broadcasts.
    pub request_id: Option<RequestId>,

    /// Command name; present on requests and broadcasts, absent on responses.
    pub cmd: Option<String>,

    /// Arbitrary structured payload.
    #[serde(default)]
    pub payload: Value,

    /// Result status; present only on responses.
    pub ret: Option<i32>,

    /// Human-readable error detail when `ret != 0`.
    pub msg: Option<String>,

    /// Declared sender origin, checked by the validator.
    pub origin: Option<String>,

    /// Pairing token exchanged during the readiness handshake.
    pub peer_key: Option<String>,

    /// Sender identity used by hub routing.
    pub client_id: Option<String>,
}

impl MessageEnvelope {
    /// Build a request envelope.
    pub fn request(request_id: RequestId, cmd: impl Into<String>, payload: Value) -> Self {
        Self {
            request_id: Some(request_id),
            cmd: Some(cmd.into()),
            payload,
            ret: None,
            msg: None,
            origin: None,
            peer_key: None,
            client_id: None,
        }
    }

    /// Build a response envelope correlated to `request_id`.
    pub fn response(
        request_id: RequestId,
        code: ReplyCode,
        data: Value,
        msg: Option<String>,
    ) -> Self {
        Self {
            request_id: Some(request_id),
            cmd: None,
            payload: data,
            ret: Some(code.as_i32()),
            msg,
            origin: None,
            peer_key: None,
            client_id: None,
        }
    }

    /// Build a one-way broadcast envelope.
    pub fn broadcast(cmd: impl Into<String>, payload: Value) -> Self {
        Self {
            request_id: None,
            cmd: Some(cmd.into()),
            payload,
            ret: None,
            msg: None,
            origin: None,
            peer_key: None,
            client_id: None,
        }
    }

    /// Build a readiness handshake envelope carrying the local peer key.
    pub fn ready(peer_key: impl Into<String>) -> Self {
        Self {
            request_id: None,
            cmd: Some(READY_COMMAND.to_string()),
            payload: Value::Null,
            ret: None,
            msg: None,
            origin: None,
            peer_key: Some(peer_key.into()),
            client_id: None,
        }
    }

    /// Attach a declared origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Attach the pairing token.
    pub fn with_peer_key(mut self, peer_key: impl Into<String>) -> Self {
        self.peer_key = Some(peer_key.into());
        self
    }

    /// Attach the sender identity used by hub routing.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Classify the envelope. Returns `None` when the field combination
    /// matches none of the protocol shapes (e.g. both `cmd` and `ret` set).
    pub fn kind(&self) -> Option<EnvelopeKind> {
        match (&self.cmd, self.request_id, self.ret) {
            (Some(cmd), None, None) if cmd == READY_COMMAND => Some(EnvelopeKind::Ready),
            (Some(_), Some(_), None) => Some(EnvelopeKind::Request),
            (None, Some(_), Some(_)) => Some(EnvelopeKind::Response),
            (Some(_), None, None) => Some(EnvelopeKind::Broadcast),
            _ => None,
        }
    }

    /// Serialized payload size in bytes, as counted against the configured
    /// maximum message size.
    pub fn payload_size(&self) -> usize {
        if self.payload.is_null() {
            return 0;
        }
        serde_json::to_vec(&self.payload).map(|v| v.len()).unwrap_or(usize::MAX)
    }
}

/// The shape surfaced to `publish` callers once a request settles.
///
/// `data` is only meaningful when `ret == 0`; failures carry their detail
/// in `msg`. Remote failures never raise — callers branch on `ret`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Status code; `0` success, negative per failure kind.
    pub ret: i32,
    /// Handler return value on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable error detail on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl Reply {
    pub fn ok(data: Value) -> Self {
        Self {
            ret: ReplyCode::Ok.as_i32(),
            data: Some(data),
            msg: None,
        }
    }

    pub fn failure(code: ReplyCode, msg: impl Into<String>) -> Self {
        Self {
            ret: code.as_i32(),
            data: None,
            msg: Some(msg.into()),
        }
    }

    /// Reconstruct the caller-visible reply from a response envelope.
    pub fn from_envelope(env: &MessageEnvelope) -> Self {
        let ret = env.ret.unwrap_or_else(|| ReplyCode::HandlerError.as_i32());
        Self {
            ret,
            data: if ret == 0 { Some(env.payload.clone()) } else { None },
            msg: env.msg.clone(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.ret == 0
    }

    pub fn code(&self) -> ReplyCode {
        ReplyCode::from_i32(self.ret)
    }
}

/// Monotonic request-id source seeded with 64 bits of entropy, so ids never
/// collide within a channel lifetime and rarely collide across channels.
#[derive(Debug)]
pub(crate) struct RequestIdGen {
    next: AtomicU64,
}

impl RequestIdGen {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(rand::random::<u64>()),
        }
    }

    pub fn next_id(&self) -> RequestId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classification() {
        let req = MessageEnvelope::request(7, "ping", Value::Null);
        assert_eq!(req.kind(), Some(EnvelopeKind::Request));

        let resp = MessageEnvelope::response(7, ReplyCode::Ok, json!({"pong": true}), None);
        assert_eq!(resp.kind(), Some(EnvelopeKind::Response));

        let bcast = MessageEnvelope::broadcast("tick", Value::Null);
        assert_eq!(bcast.kind(), Some(EnvelopeKind::Broadcast));

        let ready = MessageEnvelope::ready("key");
        assert_eq!(ready.kind(), Some(EnvelopeKind::Ready));
    }

    #[test]
    fn test_ambiguous_envelope_is_unclassified() {
        let mut env = MessageEnvelope::request(1, "x", Value::Null);
        env.ret = Some(0);
        assert_eq!(env.kind(), None);

        let mut env = MessageEnvelope::response(1, ReplyCode::Ok, Value::Null, None);
        env.request_id = None;
        assert_eq!(env.kind(), None);
    }

    #[test]
    fn test_reply_code_roundtrip() {
        for code in [
            ReplyCode::Ok,
            ReplyCode::Timeout,
            ReplyCode::NoHandler,
            ReplyCode::Destroyed,
            ReplyCode::HandlerError,
            ReplyCode::RateLimited,
            ReplyCode::Oversized,
            ReplyCode::UnauthorizedOrigin,
        ] {
            assert_eq!(ReplyCode::from_i32(code.as_i32()), code);
        }
    }

    #[test]
    fn test_reply_from_envelope_success_carries_data() {
        let env = MessageEnvelope::response(9, ReplyCode::Ok, json!([1, 2, 3]), None);
        let reply = Reply::from_envelope(&env);
        assert!(reply.is_ok());
        assert_eq!(reply.data, Some(json!([1, 2, 3])));
    }

    #[test]
    fn test_reply_from_envelope_failure_drops_data() {
        let env = MessageEnvelope::response(
            9,
            ReplyCode::NoHandler,
            json!({"ignored": true}),
            Some("no handler".into()),
        );
        let reply = Reply::from_envelope(&env);
        assert!(!reply.is_ok());
        assert_eq!(reply.code(), ReplyCode::NoHandler);
        assert!(reply.data.is_none());
    }

    #[test]
    fn test_request_ids_monotonic() {
        let ids = RequestIdGen::new();
        let a = ids.next_id();
        let b = ids.next_id();
        let c = ids.next_id();
        assert_eq!(b, a.wrapping_add(1));
        assert_eq!(c, b.wrapping_add(1));
    }

    #[test]
    fn test_payload_size_null_is_zero() {
        let env = MessageEnvelope::broadcast("tick", Value::Null);
        assert_eq!(env.payload_size(), 0);
    }
}
