//! # Channel Protocol Engine
//!
//! One `Channel` owns one logical conversation with one peer over a
//! fire-and-forget transport, and turns it into a reliable
//! request/response link:
//!
//! - `publish` correlates each request to its eventual response through a
//!   pending table keyed by request id, with a per-request deadline
//! - `subscribe` registers the handler invoked for matching inbound
//!   requests; every accepted request is answered exactly once
//! - `broadcast`/`on_broadcast` provide the one-way variant
//! - outbound traffic is queued until the peer signals readiness, then
//!   flushed in send order
//!
//! The pending table, subscription tables and outbound queue are owned
//! exclusively by the channel and mutated only inside short synchronous
//! dispatch steps; the state lock is never held across an await point.
//! Handlers run in spawned tasks and may overlap freely — correlation by
//! request id makes out-of-order completion safe.

use crate::config::ChannelConfig;
use crate::core::envelope::{
    EnvelopeKind, MessageEnvelope, Reply, ReplyCode, RequestId, RequestIdGen,
};
use crate::error::{constants, ChannelError, Result, ValidationError};
use crate::protocol::dispatcher::{into_handler, Dispatcher, Handler, HandlerResult};
use crate::protocol::handshake;
use crate::protocol::timeout::{TimeoutHandle, TimeoutManager};
use crate::protocol::validator;
use crate::transport::Transport;
use crate::utils::events::{Event, EventEmitter, EventKind};
use crate::utils::metrics::global_metrics;
use crate::utils::rate_limit::RateLimiter;
use futures::FutureExt;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, instrument, trace, warn};

/// One in-flight correlation entry, settled exactly once by whichever of
/// {matching response, timeout, destroy} happens first.
struct PendingRequest {
    reply_tx: oneshot::Sender<Reply>,
    timeout: TimeoutHandle,
    created_at: Instant,
}

/// Mutable channel state, guarded by one lock held only for synchronous
/// dispatch steps.
struct ChannelState {
    destroyed: bool,
    peer_ready: bool,
    peer_key: Option<String>,
    pending: HashMap<RequestId, PendingRequest>,
    queue: VecDeque<MessageEnvelope>,
}

struct ChannelInner {
    config: ChannelConfig,
    transport: Arc<dyn Transport>,
    state: Mutex<ChannelState>,
    dispatcher: Dispatcher,
    limiter: Mutex<RateLimiter>,
    timeouts: TimeoutManager,
    events: EventEmitter,
    request_ids: RequestIdGen,
    local_key: String,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        self.timeouts.cancel_all();
    }
}

/// Reliable request/response and fire-and-forget messaging over one
/// logical link to one peer.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub fn new(config: ChannelConfig, transport: Arc<dyn Transport>) -> Self {
        let limiter = RateLimiter::new(config.rate_limit);
        Self {
            inner: Arc::new(ChannelInner {
                config,
                transport,
                state: Mutex::new(ChannelState {
                    destroyed: false,
                    peer_ready: false,
                    peer_key: None,
                    pending: HashMap::new(),
                    queue: VecDeque::new(),
                }),
                dispatcher: Dispatcher::new(),
                limiter: Mutex::new(limiter),
                timeouts: TimeoutManager::new(),
                events: EventEmitter::new(),
                request_ids: RequestIdGen::new(),
                local_key: handshake::generate_peer_key(),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ChannelState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Stamp an outbound envelope with this side's identity.
    fn decorate(&self, mut env: MessageEnvelope) -> MessageEnvelope {
        if let Some(origin) = &self.inner.config.origin {
            env.origin = Some(origin.clone());
        }
        if let Some(client_id) = &self.inner.config.client_id {
            env.client_id = Some(client_id.clone());
        }
        if env.peer_key.is_none() {
            env.peer_key = Some(self.inner.local_key.clone());
        }
        env
    }

    /// Publish a named command and await its correlated response (or a
    /// typed failure) within the configured default timeout.
    ///
    /// Remote-side failures never raise: they arrive as a [`Reply`] with a
    /// negative `ret`. Only local precondition violations — destroyed
    /// channel, oversized payload, exceeded rate limit — return `Err`, and
    /// they do so before anything touches the transport.
    pub async fn publish(&self, cmd: impl Into<String>, payload: Value) -> Result<Reply> {
        let timeout = self.inner.config.default_timeout;
        self.publish_with_timeout(cmd, payload, timeout).await
    }

    /// Publish with a per-call deadline override.
    #[instrument(skip_all, level = "debug")]
    pub async fn publish_with_timeout(
        &self,
        cmd: impl Into<String>,
        payload: Value,
        timeout: Duration,
    ) -> Result<Reply> {
        if self.is_destroyed() {
            return Err(ChannelError::Destroyed);
        }

        let id = self.inner.request_ids.next_id();
        let env = self.decorate(MessageEnvelope::request(id, cmd, payload));
        let size = self.check_outbound_size(&env)?;
        self.acquire_send_slot()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        let weak = Arc::downgrade(&self.inner);
        let mut to_send = None;
        {
            let mut state = self.lock_state();
            if state.destroyed {
                return Err(ChannelError::Destroyed);
            }
            let handle = self
                .inner
                .timeouts
                .schedule(timeout, move || settle_timeout(&weak, id));
            state.pending.insert(
                id,
                PendingRequest {
                    reply_tx,
                    timeout: handle,
                    created_at: Instant::now(),
                },
            );
            if state.peer_ready {
                to_send = Some(env);
            } else {
                trace!(request_id = id, "Peer not ready, queueing request");
                state.queue.push_back(env);
            }
        }

        if let Some(env) = to_send {
            if let Err(e) = self.inner.transport.send(env) {
                // The envelope never left; unwind the bookkeeping and
                // surface the transport failure locally.
                if let Some(entry) = self.lock_state().pending.remove(&id) {
                    self.inner.timeouts.cancel(entry.timeout);
                }
                return Err(e);
            }
        }
        global_metrics().request_sent(size as u64);

        match reply_rx.await {
            Ok(reply) => Ok(reply),
            Err(_) => Ok(Reply::failure(
                ReplyCode::Destroyed,
                constants::ERR_CHANNEL_DESTROYED,
            )),
        }
    }

    /// Send a one-way message: no request id, no response, no timeout.
    pub fn broadcast(&self, cmd: impl Into<String>, payload: Value) -> Result<()> {
        if self.is_destroyed() {
            return Err(ChannelError::Destroyed);
        }

        let env = self.decorate(MessageEnvelope::broadcast(cmd, payload));
        let size = self.check_outbound_size(&env)?;
        self.acquire_send_slot()?;

        let mut to_send = None;
        {
            let mut state = self.lock_state();
            if state.destroyed {
                return Err(ChannelError::Destroyed);
            }
            if state.peer_ready {
                to_send = Some(env);
            } else {
                trace!("Peer not ready, queueing broadcast");
                state.queue.push_back(env);
            }
        }
        if let Some(env) = to_send {
            self.inner.transport.send(env)?;
        }
        global_metrics().broadcast_sent(size as u64);
        Ok(())
    }

    /// Register the handler invoked for inbound requests naming `cmd`.
    /// The handler's `Ok` value becomes the success response data; an
    /// `Err` (or a panic) becomes a handler-error response. Last
    /// registration wins.
    pub fn subscribe<F, Fut>(&self, cmd: &str, f: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe_handler(cmd, into_handler(f))
    }

    /// Register an already-boxed handler. Used by the hub to apply global
    /// subscriptions to every client channel.
    pub fn subscribe_handler(&self, cmd: &str, handler: Handler) -> Result<()> {
        if self.is_destroyed() {
            return Err(ChannelError::Destroyed);
        }
        self.inner.dispatcher.register(cmd, handler)
    }

    /// Remove the handler for `cmd`. Returns whether one was registered.
    pub fn unsubscribe(&self, cmd: &str) -> Result<bool> {
        self.inner.dispatcher.unregister(cmd)
    }

    /// Register the handler invoked for inbound broadcasts naming `cmd`.
    /// The handler's return value is discarded.
    pub fn on_broadcast<F, Fut>(&self, cmd: &str, f: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        if self.is_destroyed() {
            return Err(ChannelError::Destroyed);
        }
        self.inner.dispatcher.register_broadcast(cmd, into_handler(f))
    }

    /// Announce to the peer that this side can receive traffic. Goes out
    /// immediately — the handshake itself must not wait in the queue.
    pub fn signal_ready(&self) -> Result<()> {
        if self.is_destroyed() {
            return Err(ChannelError::Destroyed);
        }
        let env = handshake::ready_envelope(
            &self.inner.local_key,
            self.inner.config.app_type.as_deref(),
            self.inner.config.app_name.as_deref(),
        );
        self.inner.transport.send(self.decorate(env))
    }

    /// Inbound dispatch entry point: validate, classify, and route one
    /// envelope pushed in by the transport adapter. Must be called within
    /// a tokio runtime (handlers are spawned).
    #[instrument(skip_all, level = "debug")]
    pub fn handle_incoming(&self, env: MessageEnvelope) {
        if self.is_destroyed() {
            trace!("Envelope arrived after destruction, dropped");
            return;
        }

        let kind = match validator::check_structure(&env) {
            Ok(kind) => kind,
            Err(e) => return self.drop_invalid(e),
        };
        if let Err(e) = validator::check_size(&env, self.inner.config.max_message_size) {
            return self.drop_invalid(e);
        }
        if let Some(expected) = &self.inner.config.expected_origin {
            if let Err(e) = validator::check_origin(env.origin.as_deref(), expected) {
                return self.drop_invalid(e);
            }
        }
        if kind != EnvelopeKind::Ready && self.inner.config.require_peer_key {
            let paired = self.lock_state().peer_key.clone();
            if let Some(key) = paired {
                if let Err(e) = validator::check_peer_key(env.peer_key.as_deref(), &key) {
                    return self.drop_invalid(e);
                }
            }
        }

        match kind {
            EnvelopeKind::Ready => self.on_ready(env),
            EnvelopeKind::Response => self.on_response(env),
            EnvelopeKind::Request => self.on_request(env),
            EnvelopeKind::Broadcast => self.on_broadcast_envelope(env),
        }
    }

    /// Idempotent terminal operation: reject every pending request with a
    /// destroyed reply, clear the subscription tables and queue, cancel
    /// all timers, and refuse any further traffic.
    pub fn destroy(&self) {
        let drained = {
            let mut state = self.lock_state();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            state.peer_ready = false;
            state.peer_key = None;
            state.queue.clear();
            std::mem::take(&mut state.pending)
        };

        self.inner.timeouts.cancel_all();
        for (id, entry) in drained {
            trace!(request_id = id, "Rejecting pending request on destroy");
            let _ = entry.reply_tx.send(Reply::failure(
                ReplyCode::Destroyed,
                constants::ERR_CHANNEL_DESTROYED,
            ));
        }
        self.inner.dispatcher.clear();
        self.inner
            .limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();

        debug!("Channel destroyed");
        self.inner.events.emit(&Event::new(EventKind::Disconnect));
    }

    pub fn is_destroyed(&self) -> bool {
        self.lock_state().destroyed
    }

    /// Whether the peer has completed the readiness handshake
    pub fn is_peer_ready(&self) -> bool {
        self.lock_state().peer_ready
    }

    /// Number of requests awaiting a response
    pub fn pending_count(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// Number of envelopes queued for the readiness flush
    pub fn queued_count(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Lifecycle bus for connect/ready/disconnect/error notifications
    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    /// The pairing token this side announces in its readiness handshake
    pub fn local_peer_key(&self) -> &str {
        &self.inner.local_key
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    // ---- inbound dispatch steps -------------------------------------------

    fn drop_invalid(&self, err: ValidationError) {
        global_metrics().validation_failure();
        warn!(error = %err, "Dropping invalid inbound envelope");
        self.inner
            .events
            .emit(&Event::new(EventKind::Error).with_detail(err.to_string()));
    }

    fn on_ready(&self, env: MessageEnvelope) {
        let paired = self.lock_state().peer_key.clone();
        let key = match handshake::accept_ready(&env, paired.as_deref()) {
            Ok(key) => key,
            Err(e) => return self.drop_invalid(e),
        };

        let flush: Vec<MessageEnvelope> = {
            let mut state = self.lock_state();
            if state.destroyed {
                return;
            }
            state.peer_key = Some(key);
            state.peer_ready = true;
            state.queue.drain(..).collect()
        };

        if !flush.is_empty() {
            debug!(count = flush.len(), "Peer ready, flushing queued envelopes");
            global_metrics().queue_flush(flush.len() as u64);
            for queued in flush {
                if let Err(e) = self.inner.transport.send(queued) {
                    warn!(error = %e, "Failed to flush queued envelope");
                }
            }
        }

        let mut event = Event::new(EventKind::Ready);
        if let Some(client_id) = &env.client_id {
            event = event.with_client_id(client_id.clone());
        }
        self.inner.events.emit(&event);
    }

    fn on_response(&self, env: MessageEnvelope) {
        let Some(id) = env.request_id else { return };

        let entry = self.lock_state().pending.remove(&id);
        match entry {
            Some(entry) => {
                self.inner.timeouts.cancel(entry.timeout);
                global_metrics().response_received(env.payload_size() as u64);
                trace!(
                    request_id = id,
                    elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
                    "Response correlated"
                );
                let _ = entry.reply_tx.send(Reply::from_envelope(&env));
            }
            None => {
                // Late, already timed out, or foreign — dropped without error
                global_metrics().unmatched_response();
                trace!(request_id = id, "Unmatched response dropped");
            }
        }
    }

    fn on_request(&self, env: MessageEnvelope) {
        let Some(id) = env.request_id else { return };
        let Some(cmd) = env.cmd else { return };

        let handler = match self.inner.dispatcher.lookup(&cmd) {
            Ok(handler) => handler,
            Err(e) => {
                warn!(error = %e, "Dispatcher lookup failed");
                return;
            }
        };

        match handler {
            None => {
                global_metrics().no_handler();
                debug!(cmd = %cmd, "No handler registered, answering no-handler");
                self.send_response(MessageEnvelope::response(
                    id,
                    ReplyCode::NoHandler,
                    Value::Null,
                    Some(format!("{}: {cmd}", constants::ERR_NO_HANDLER)),
                ));
            }
            Some(handler) => {
                // Handlers are not serialized: each runs in its own task
                // and whichever finishes first responds first.
                let channel = self.clone();
                let payload = env.payload;
                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(handler(payload)).catch_unwind().await;
                    let response = match outcome {
                        Ok(Ok(data)) => MessageEnvelope::response(id, ReplyCode::Ok, data, None),
                        Ok(Err(msg)) => {
                            global_metrics().handler_error();
                            debug!(cmd = %cmd, "Handler failed");
                            MessageEnvelope::response(
                                id,
                                ReplyCode::HandlerError,
                                Value::Null,
                                Some(msg),
                            )
                        }
                        Err(_) => {
                            global_metrics().handler_error();
                            warn!(cmd = %cmd, "Handler panicked");
                            MessageEnvelope::response(
                                id,
                                ReplyCode::HandlerError,
                                Value::Null,
                                Some(constants::ERR_HANDLER_PANICKED.to_string()),
                            )
                        }
                    };
                    channel.send_response(response);
                });
            }
        }
    }

    fn on_broadcast_envelope(&self, env: MessageEnvelope) {
        let Some(cmd) = env.cmd else { return };

        match self.inner.dispatcher.lookup_broadcast(&cmd) {
            Ok(Some(handler)) => {
                let payload = env.payload;
                tokio::spawn(async move {
                    // One-way traffic: the return value and any failure
                    // are discarded.
                    let _ = AssertUnwindSafe(handler(payload)).catch_unwind().await;
                });
            }
            Ok(None) => trace!(cmd = %cmd, "No broadcast handler registered"),
            Err(e) => warn!(error = %e, "Dispatcher lookup failed"),
        }
    }

    /// Responses bypass the rate limiter and the readiness queue: the
    /// request already proved the peer can reach us, and starving a
    /// response would only make the requester time out needlessly.
    fn send_response(&self, env: MessageEnvelope) {
        if self.is_destroyed() {
            return;
        }
        match self.inner.transport.send(self.decorate(env)) {
            Ok(()) => global_metrics().response_sent(),
            Err(e) => warn!(error = %e, "Failed to send response"),
        }
    }

    // ---- local precondition helpers ---------------------------------------

    fn check_outbound_size(&self, env: &MessageEnvelope) -> Result<usize> {
        validator::check_size(env, self.inner.config.max_message_size).map_err(|e| match e {
            ValidationError::PayloadTooLarge { size, max } => {
                ChannelError::OversizedPayload { size, max }
            }
            other => ChannelError::Validation(other),
        })
    }

    fn acquire_send_slot(&self) -> Result<()> {
        let allowed = self
            .inner
            .limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire();
        if allowed {
            Ok(())
        } else {
            global_metrics().rate_limited();
            Err(ChannelError::RateLimited)
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("destroyed", &self.is_destroyed())
            .field("peer_ready", &self.is_peer_ready())
            .field("pending", &self.pending_count())
            .field("queued", &self.queued_count())
            .finish_non_exhaustive()
    }
}

/// Timeout path for one pending request. Runs only if the entry is still
/// in the table — a response or destroy that got there first wins.
fn settle_timeout(weak: &Weak<ChannelInner>, id: RequestId) {
    let Some(inner) = weak.upgrade() else { return };
    let entry = inner
        .state
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pending
        .remove(&id);
    if let Some(entry) = entry {
        global_metrics().request_timed_out();
        debug!(request_id = id, "Request timed out");
        let _ = entry.reply_tx.send(Reply::failure(
            ReplyCode::Timeout,
            constants::ERR_REQUEST_TIMEOUT,
        ));
    }
}
