//! Inbound Envelope Validation
//!
//! Pure, side-effect-free predicates run before any envelope is accepted
//! for dispatch. A failing check means the envelope is dropped at the
//! boundary (and logged by the caller); it never reaches a handler lookup.
//!
//! Peer-identity checks compare the declared origin against the configured
//! expected origin with exact scheme+host+port equality. No wildcards.
//! Where a pairing token was exchanged during the readiness handshake, the
//! token on every later envelope must match, defending against
//! echo/loopback traffic and unrelated same-origin listeners.

use crate::core::envelope::{EnvelopeKind, MessageEnvelope};
use crate::error::ValidationError;
use url::Url;

/// Check structural well-formedness and classify the envelope.
///
/// Required fields must be present and the field combination must match
/// exactly one protocol shape.
pub fn check_structure(env: &MessageEnvelope) -> Result<EnvelopeKind, ValidationError> {
    let kind = env.kind().ok_or(ValidationError::AmbiguousEnvelope)?;

    if matches!(kind, EnvelopeKind::Request | EnvelopeKind::Broadcast) {
        let empty = env.cmd.as_deref().map(str::is_empty).unwrap_or(true);
        if empty {
            return Err(ValidationError::MissingCommand);
        }
    }

    if kind == EnvelopeKind::Ready && env.peer_key.is_none() {
        return Err(ValidationError::PeerKeyMissing);
    }

    Ok(kind)
}

/// Check the serialized payload against the configured maximum size.
/// Oversized envelopes are rejected whole, never partially processed.
pub fn check_size(env: &MessageEnvelope, max: usize) -> Result<usize, ValidationError> {
    let size = env.payload_size();
    if size > max {
        return Err(ValidationError::PayloadTooLarge { size, max });
    }
    Ok(size)
}

/// Check the declared origin against the expected origin.
///
/// Equality is on the parsed (scheme, host, port) triple, so textual
/// variants of the same origin ("https://a.example" vs "https://a.example/")
/// compare equal, while a differing port never does.
pub fn check_origin(declared: Option<&str>, expected: &str) -> Result<(), ValidationError> {
    let expected_url = Url::parse(expected)
        .map_err(|_| ValidationError::MalformedOrigin(expected.to_string()))?;

    let declared_str = declared.ok_or_else(|| ValidationError::OriginMismatch {
        declared: None,
        expected: expected.to_string(),
    })?;

    let declared_url = Url::parse(declared_str)
        .map_err(|_| ValidationError::MalformedOrigin(declared_str.to_string()))?;

    let matches = declared_url.scheme() == expected_url.scheme()
        && declared_url.host_str() == expected_url.host_str()
        && declared_url.port_or_known_default() == expected_url.port_or_known_default();

    if matches {
        Ok(())
    } else {
        Err(ValidationError::OriginMismatch {
            declared: Some(declared_str.to_string()),
            expected: expected.to_string(),
        })
    }
}

/// Check the pairing token once one has been exchanged.
pub fn check_peer_key(declared: Option<&str>, expected: &str) -> Result<(), ValidationError> {
    match declared {
        Some(key) if key == expected => Ok(()),
        _ => Err(ValidationError::PeerKeyMismatch),
    }
}
