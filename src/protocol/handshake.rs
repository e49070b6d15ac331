//! Readiness handshake
//!
//! A newly created peer (e.g. a frame still loading) cannot receive
//! traffic yet. The handshake bridges that gap: each side generates a
//! pairing token ("peer key"), and announces readiness with a dedicated
//! envelope carrying it. Until the ready envelope is observed, outbound
//! request/broadcast traffic accumulates in the channel's queue; the
//! moment readiness is observed the queue is flushed in send order.
//!
//! The peer key also anchors the identity check on every later envelope:
//! once a key has been exchanged, traffic presenting a different key is
//! dropped at the validation boundary.

use crate::core::envelope::MessageEnvelope;
use crate::error::ValidationError;
use tracing::debug;

/// Length of the pairing token in random bytes (hex-encoded on the wire)
const PEER_KEY_BYTES: usize = 16;

/// Generate a fresh pairing token with 128 bits of entropy.
pub fn generate_peer_key() -> String {
    let bytes = rand::random::<[u8; PEER_KEY_BYTES]>();
    let mut key = String::with_capacity(PEER_KEY_BYTES * 2);
    for b in bytes {
        key.push_str(&format!("{b:02x}"));
    }
    key
}

/// Build the readiness envelope announcing `local_key`, optionally tagged
/// with the application identity the hub records per client.
pub fn ready_envelope(
    local_key: &str,
    app_type: Option<&str>,
    app_name: Option<&str>,
) -> MessageEnvelope {
    let mut payload = serde_json::Map::new();
    if let Some(t) = app_type {
        payload.insert("app_type".into(), t.into());
    }
    if let Some(n) = app_name {
        payload.insert("app_name".into(), n.into());
    }
    let payload = if payload.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(payload)
    };

    let mut env = MessageEnvelope::ready(local_key);
    env.payload = payload;
    env
}

/// Accept an inbound ready envelope and return the peer key to pair with.
///
/// A repeated ready from the same peer must present the same key; a
/// different key is rejected so a hijacker cannot re-pair an established
/// channel.
pub fn accept_ready(
    env: &MessageEnvelope,
    paired_key: Option<&str>,
) -> Result<String, ValidationError> {
    let presented = env
        .peer_key
        .as_deref()
        .ok_or(ValidationError::PeerKeyMissing)?;

    match paired_key {
        None => {
            debug!("Peer signaled readiness, pairing");
            Ok(presented.to_string())
        }
        Some(existing) if existing == presented => Ok(existing.to_string()),
        Some(_) => Err(ValidationError::PeerKeyMismatch),
    }
}

/// Extract the application tags from a ready envelope's payload.
pub fn ready_tags(env: &MessageEnvelope) -> (Option<String>, Option<String>) {
    let get = |field: &str| {
        env.payload
            .get(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };
    (get("app_type"), get("app_name"))
}
