#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Comprehensive edge-case tests for production-grade reliability.
//! Covers boundary conditions, failure preconditions, timeout races,
//! validation drops, and destruction semantics.

use message_channel::config::ChannelConfig;
use message_channel::core::envelope::{MessageEnvelope, ReplyCode};
use message_channel::error::ChannelError;
use message_channel::protocol::channel::Channel;
use message_channel::transport::Transport;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport double that records every envelope instead of delivering it.
#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<MessageEnvelope>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn sent(&self) -> Vec<MessageEnvelope> {
        self.sent.lock().unwrap().clone()
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, envelope: MessageEnvelope) -> message_channel::error::Result<()> {
        self.sent.lock().unwrap().push(envelope);
        Ok(())
    }
}

/// Mark the peer as ready by injecting a readiness envelope.
fn make_peer_ready(channel: &Channel) {
    channel.handle_incoming(MessageEnvelope::ready("peer-key-for-tests"));
    assert!(channel.is_peer_ready());
}

// ============================================================================
// LOCAL PRECONDITION FAILURES
// ============================================================================

#[tokio::test]
async fn test_oversized_payload_rejected_before_transport() {
    let transport = RecordingTransport::new();
    let config = ChannelConfig {
        max_message_size: 64,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(config, transport.clone());
    make_peer_ready(&channel);

    let result = channel
        .publish("upload", json!({ "blob": "x".repeat(256) }))
        .await;

    match result {
        Err(ChannelError::OversizedPayload { size, max }) => {
            assert!(size > max);
            assert_eq!(max, 64);
        }
        other => panic!("Expected OversizedPayload, got {other:?}"),
    }
    assert_eq!(transport.sent_count(), 0);
    assert_eq!(channel.pending_count(), 0);
}

#[tokio::test]
async fn test_rate_limit_excess_fails_fast_without_delivery() {
    let transport = RecordingTransport::new();
    let config = ChannelConfig {
        rate_limit: 3,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(config, transport.clone());
    make_peer_ready(&channel);

    for i in 0..3 {
        channel.broadcast("tick", json!(i)).unwrap();
    }
    let denied = channel.broadcast("tick", json!(3));
    assert!(matches!(denied, Err(ChannelError::RateLimited)));

    // Exactly the three allowed sends hit the transport
    assert_eq!(transport.sent_count(), 3);
}

#[tokio::test]
async fn test_publish_on_destroyed_channel_fails_synchronously() {
    let transport = RecordingTransport::new();
    let channel = Channel::new(ChannelConfig::default(), transport.clone());
    channel.destroy();

    let result = channel.publish("anything", Value::Null).await;
    assert!(matches!(result, Err(ChannelError::Destroyed)));
    assert!(matches!(
        channel.broadcast("anything", Value::Null),
        Err(ChannelError::Destroyed)
    ));
    assert_eq!(transport.sent_count(), 0);
}

// ============================================================================
// DESTRUCTION SEMANTICS
// ============================================================================

#[tokio::test]
async fn test_destroy_settles_pending_with_destroyed_code() {
    let transport = RecordingTransport::new();
    let channel = Channel::new(ChannelConfig::default(), transport.clone());
    make_peer_ready(&channel);

    let pending = {
        let channel = channel.clone();
        tokio::spawn(async move { channel.publish("never-answered", Value::Null).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(channel.pending_count(), 1);

    channel.destroy();

    let reply = pending.await.unwrap().unwrap();
    assert_eq!(reply.code(), ReplyCode::Destroyed);
    assert_eq!(channel.pending_count(), 0);
}

#[tokio::test]
async fn test_destroy_is_idempotent() {
    let channel = Channel::new(ChannelConfig::default(), RecordingTransport::new());
    make_peer_ready(&channel);

    channel.destroy();
    let first = channel.is_destroyed();
    channel.destroy();

    assert!(first);
    assert!(channel.is_destroyed());
    assert_eq!(channel.pending_count(), 0);
    assert_eq!(channel.queued_count(), 0);
}

#[tokio::test]
async fn test_inbound_after_destroy_is_ignored() {
    let transport = RecordingTransport::new();
    let channel = Channel::new(ChannelConfig::default(), transport.clone());
    channel
        .subscribe("ping", |_| async { Ok(Value::Null) })
        .unwrap();
    channel.destroy();

    channel.handle_incoming(MessageEnvelope::request(1, "ping", Value::Null));
    tokio::time::sleep(Duration::from_millis(20)).await;

    // No response was produced for the post-destruction request
    assert_eq!(transport.sent_count(), 0);
}

// ============================================================================
// TIMEOUTS AND CORRELATION
// ============================================================================

#[tokio::test]
async fn test_unanswered_publish_times_out_and_cleans_up() {
    let transport = RecordingTransport::new();
    let channel = Channel::new(ChannelConfig::default(), transport.clone());
    make_peer_ready(&channel);

    let start = std::time::Instant::now();
    let reply = channel
        .publish_with_timeout("void", Value::Null, Duration::from_millis(80))
        .await
        .unwrap();

    assert_eq!(reply.code(), ReplyCode::Timeout);
    assert!(start.elapsed() >= Duration::from_millis(80));
    assert_eq!(channel.pending_count(), 0);
}

#[tokio::test]
async fn test_late_response_after_timeout_is_dropped() {
    let transport = RecordingTransport::new();
    let channel = Channel::new(ChannelConfig::default(), transport.clone());
    make_peer_ready(&channel);

    let reply = channel
        .publish_with_timeout("slowpoke", Value::Null, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(reply.code(), ReplyCode::Timeout);

    // Replay the response the peer would have sent, too late
    let request = transport.sent().into_iter().next().unwrap();
    let late = MessageEnvelope::response(
        request.request_id.unwrap(),
        ReplyCode::Ok,
        json!("finally"),
        None,
    );
    channel.handle_incoming(late);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(channel.pending_count(), 0);
}

#[tokio::test]
async fn test_foreign_response_is_dropped_without_error() {
    let channel = Channel::new(ChannelConfig::default(), RecordingTransport::new());
    make_peer_ready(&channel);

    channel.handle_incoming(MessageEnvelope::response(
        0xDEAD_BEEF,
        ReplyCode::Ok,
        Value::Null,
        None,
    ));
    assert_eq!(channel.pending_count(), 0);
}

#[tokio::test]
async fn test_response_beats_timeout_when_both_race() {
    let transport = RecordingTransport::new();
    let channel = Channel::new(ChannelConfig::default(), transport.clone());
    make_peer_ready(&channel);

    let publisher = {
        let channel = channel.clone();
        tokio::spawn(async move {
            channel
                .publish_with_timeout("racy", Value::Null, Duration::from_millis(200))
                .await
        })
    };

    // Answer well before the deadline
    tokio::time::sleep(Duration::from_millis(30)).await;
    let request = transport.sent().into_iter().next().unwrap();
    channel.handle_incoming(MessageEnvelope::response(
        request.request_id.unwrap(),
        ReplyCode::Ok,
        json!("made it"),
        None,
    ));

    let reply = publisher.await.unwrap().unwrap();
    assert!(reply.is_ok());
    assert_eq!(reply.data, Some(json!("made it")));

    // The losing timeout path must not fire later or disturb anything
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(channel.pending_count(), 0);
}

// ============================================================================
// READINESS QUEUE
// ============================================================================

#[tokio::test]
async fn test_queued_sends_flush_in_enqueue_order() {
    let transport = RecordingTransport::new();
    let channel = Channel::new(ChannelConfig::default(), transport.clone());

    channel.broadcast("first", json!(1)).unwrap();
    channel.broadcast("second", json!(2)).unwrap();
    channel.broadcast("third", json!(3)).unwrap();
    assert_eq!(channel.queued_count(), 3);
    assert_eq!(transport.sent_count(), 0);

    channel.handle_incoming(MessageEnvelope::ready("peer-key"));

    let flushed: Vec<String> = transport
        .sent()
        .into_iter()
        .filter_map(|env| env.cmd)
        .collect();
    assert_eq!(flushed, vec!["first", "second", "third"]);
    assert_eq!(channel.queued_count(), 0);
}

// ============================================================================
// VALIDATION BOUNDARY
// ============================================================================

#[tokio::test]
async fn test_wrong_origin_dropped_before_dispatch() {
    let transport = RecordingTransport::new();
    let config = ChannelConfig {
        expected_origin: Some("https://app.example.com".to_string()),
        ..ChannelConfig::default()
    };
    let channel = Channel::new(config, transport.clone());
    // The handshake itself is subject to the origin check too
    channel.handle_incoming(
        MessageEnvelope::ready("peer-key").with_origin("https://app.example.com"),
    );
    assert!(channel.is_peer_ready());
    channel
        .subscribe("secret", |_| async { Ok(json!("leaked")) })
        .unwrap();

    let evil =
        MessageEnvelope::request(1, "secret", Value::Null).with_origin("https://evil.example.com");
    channel.handle_incoming(evil);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.sent_count(), 0);

    let legit = MessageEnvelope::request(2, "secret", Value::Null)
        .with_origin("https://app.example.com");
    channel.handle_incoming(legit);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.sent_count(), 1);
}

#[tokio::test]
async fn test_peer_key_mismatch_dropped_once_paired() {
    let transport = RecordingTransport::new();
    let config = ChannelConfig {
        require_peer_key: true,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(config, transport.clone());
    channel
        .subscribe("op", |_| async { Ok(Value::Null) })
        .unwrap();

    channel.handle_incoming(MessageEnvelope::ready("paired-key"));
    assert!(channel.is_peer_ready());

    let imposter =
        MessageEnvelope::request(1, "op", Value::Null).with_peer_key("some-other-key");
    channel.handle_incoming(imposter);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.sent_count(), 0);

    let genuine = MessageEnvelope::request(2, "op", Value::Null).with_peer_key("paired-key");
    channel.handle_incoming(genuine);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.sent_count(), 1);
}

#[tokio::test]
async fn test_malformed_envelope_dropped() {
    let transport = RecordingTransport::new();
    let channel = Channel::new(ChannelConfig::default(), transport.clone());
    make_peer_ready(&channel);
    channel
        .subscribe("op", |_| async { Ok(Value::Null) })
        .unwrap();

    // Request and response fields set at once: classifies as nothing
    let mut mongrel = MessageEnvelope::request(1, "op", Value::Null);
    mongrel.ret = Some(0);
    channel.handle_incoming(mongrel);

    // Empty command name
    channel.handle_incoming(MessageEnvelope::request(2, "", Value::Null));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.sent_count(), 0);
}

#[tokio::test]
async fn test_oversized_inbound_dropped_whole() {
    let transport = RecordingTransport::new();
    let config = ChannelConfig {
        max_message_size: 32,
        ..ChannelConfig::default()
    };
    let channel = Channel::new(config, transport.clone());
    make_peer_ready(&channel);
    channel
        .subscribe("ingest", |_| async { Ok(Value::Null) })
        .unwrap();

    let bloated = MessageEnvelope::request(1, "ingest", json!({ "blob": "y".repeat(128) }));
    channel.handle_incoming(bloated);
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Dropped at the boundary: no handler ran, no response was emitted
    assert_eq!(transport.sent_count(), 0);
}
