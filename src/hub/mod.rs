//! # Multi-Client Hub
//!
//! One receiving endpoint often serves many independent senders, with the
//! host delivering all inbound traffic through a single entry point. The
//! hub multiplexes per-client [`Channel`]s behind that shared listener:
//! it inspects each inbound envelope's declared client identity, looks up
//! (or, in global routing mode, lazily creates) the matching channel, and
//! forwards the envelope to it.
//!
//! Beyond routing, the hub tracks per-client metadata, fans broadcasts
//! out to subsets of clients, applies global subscriptions to every
//! current and future channel, and periodically evicts clients that have
//! stopped sending.
//!
//! The client map is the only structure touched by two paths (the routing
//! listener and the cleanup sweep); every mutation is one locked step per
//! client, and channel destruction always happens outside the lock.

use crate::config::{ChannelConfig, HubConfig, ProtocolConfig, RoutingMode};
use crate::core::envelope::{EnvelopeKind, MessageEnvelope};
use crate::error::{ChannelError, Result};
use crate::protocol::channel::Channel;
use crate::protocol::dispatcher::{into_handler, Handler, HandlerResult};
use crate::protocol::handshake;
use crate::transport::{HubTransport, Transport};
use crate::utils::events::{Event, EventEmitter, EventKind};
use crate::utils::metrics::global_metrics;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

/// Per-connected-peer record, created on first valid envelope from a new
/// identity and refreshed on every subsequent one.
#[derive(Debug, Clone)]
pub struct ClientMeta {
    pub client_id: String,
    /// Free-form application type announced in the readiness handshake
    pub app_type: Option<String>,
    /// Free-form application name announced in the readiness handshake
    pub app_name: Option<String>,
    pub connected_at: Instant,
    pub last_seen: Instant,
}

struct ClientEntry {
    channel: Channel,
    meta: ClientMeta,
}

/// Adapter pinning a multi-client transport to one target client, so each
/// per-client channel sees a plain point-to-point [`Transport`].
struct ClientTransport {
    transport: Arc<dyn HubTransport>,
    client_id: String,
}

impl Transport for ClientTransport {
    fn send(&self, envelope: MessageEnvelope) -> Result<()> {
        self.transport.send_to(&self.client_id, envelope)
    }
}

struct HubInner {
    channel_config: ChannelConfig,
    config: HubConfig,
    transport: Arc<dyn HubTransport>,
    clients: RwLock<HashMap<String, ClientEntry>>,
    global_handlers: RwLock<HashMap<String, Handler>>,
    events: EventEmitter,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl HubInner {
    fn read_clients(&self) -> RwLockReadGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_clients(&self) -> RwLockWriteGuard<'_, HashMap<String, ClientEntry>> {
        self.clients.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the channel + metadata pair for a newly seen client and apply
    /// every global subscription to it.
    fn make_entry(&self, client_id: &str) -> ClientEntry {
        let channel = Channel::new(
            self.channel_config.clone(),
            Arc::new(ClientTransport {
                transport: Arc::clone(&self.transport),
                client_id: client_id.to_string(),
            }),
        );

        let globals = self
            .global_handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for (cmd, handler) in globals.iter() {
            if let Err(e) = channel.subscribe_handler(cmd, Arc::clone(handler)) {
                warn!(client_id, cmd = %cmd, error = %e, "Failed to apply global subscription");
            }
        }

        let now = Instant::now();
        ClientEntry {
            channel,
            meta: ClientMeta {
                client_id: client_id.to_string(),
                app_type: None,
                app_name: None,
                connected_at: now,
                last_seen: now,
            },
        }
    }

    /// Remove every client whose last activity is older than the
    /// staleness window, destroying the corresponding channels.
    fn sweep_stale(&self) {
        let stale_after = self.config.stale_after;
        let evicted: Vec<(String, Channel)> = {
            let mut clients = self.write_clients();
            let stale: Vec<String> = clients
                .iter()
                .filter(|(_, entry)| entry.meta.last_seen.elapsed() >= stale_after)
                .map(|(id, _)| id.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|id| clients.remove(&id).map(|entry| (id, entry.channel)))
                .collect()
        };

        for (client_id, channel) in evicted {
            warn!(client_id = %client_id, "Evicting stale client");
            global_metrics().client_evicted();
            channel.destroy();
            self.events.emit(
                &Event::new(EventKind::Disconnect)
                    .with_client_id(client_id)
                    .with_detail("stale"),
            );
        }
    }
}

/// Multi-client registry composing many [`Channel`]s behind one shared
/// physical endpoint.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new(config: ProtocolConfig, transport: Arc<dyn HubTransport>) -> Self {
        Self {
            inner: Arc::new(HubInner {
                channel_config: config.channel,
                config: config.hub,
                transport,
                clients: RwLock::new(HashMap::new()),
                global_handlers: RwLock::new(HashMap::new()),
                events: EventEmitter::new(),
                sweeper: Mutex::new(None),
            }),
        }
    }

    /// Idempotent initialization: starts the periodic cleanup sweep. The
    /// sweep holds only a weak reference, so dropping the last hub handle
    /// ends it.
    pub fn setup(&self) {
        let mut sweeper = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if sweeper.is_some() {
            return;
        }

        let interval = self.inner.config.cleanup_interval;
        let weak: Weak<HubInner> = Arc::downgrade(&self.inner);
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately; skip it so the first
            // sweep happens one full interval after setup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                trace!("Running stale-client sweep");
                inner.sweep_stale();
            }
        }));
        debug!(interval_ms = interval.as_millis() as u64, "Hub cleanup sweep started");
    }

    /// Stop the sweep and destroy every tracked channel. The hub can be
    /// set up again afterwards.
    pub fn teardown(&self) {
        let task = self
            .inner
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }

        let drained: Vec<(String, Channel)> = {
            let mut clients = self.inner.write_clients();
            clients
                .drain()
                .map(|(id, entry)| (id, entry.channel))
                .collect()
        };
        for (client_id, channel) in drained {
            global_metrics().client_disconnected();
            channel.destroy();
            self.inner
                .events
                .emit(&Event::new(EventKind::Disconnect).with_client_id(client_id));
        }
        debug!("Hub torn down");
    }

    /// Shared-listener entry point: route one inbound envelope to the
    /// sender's channel, creating it on first contact in global routing
    /// mode. In individual mode only explicitly registered clients are
    /// routed to.
    #[instrument(skip(self, env), level = "debug")]
    pub fn handle_incoming(&self, client_id: &str, env: MessageEnvelope) -> Result<()> {
        let mut created = false;
        let channel = {
            let mut clients = self.inner.write_clients();
            match clients.get_mut(client_id) {
                Some(entry) => {
                    entry.meta.last_seen = Instant::now();
                    if env.kind() == Some(EnvelopeKind::Ready) {
                        let (app_type, app_name) = handshake::ready_tags(&env);
                        entry.meta.app_type = app_type.or(entry.meta.app_type.take());
                        entry.meta.app_name = app_name.or(entry.meta.app_name.take());
                    }
                    entry.channel.clone()
                }
                None => {
                    if self.inner.config.routing_mode == RoutingMode::Individual {
                        return Err(ChannelError::UnknownClient(client_id.to_string()));
                    }
                    if clients.len() >= self.inner.config.max_clients {
                        return Err(ChannelError::ClientLimitReached(clients.len()));
                    }
                    let mut entry = self.inner.make_entry(client_id);
                    if env.kind() == Some(EnvelopeKind::Ready) {
                        let (app_type, app_name) = handshake::ready_tags(&env);
                        entry.meta.app_type = app_type;
                        entry.meta.app_name = app_name;
                    }
                    let channel = entry.channel.clone();
                    clients.insert(client_id.to_string(), entry);
                    created = true;
                    channel
                }
            }
        };

        if created {
            global_metrics().client_connected();
            debug!(client_id, "New client tracked");
            self.inner
                .events
                .emit(&Event::new(EventKind::Connect).with_client_id(client_id));
        }

        channel.handle_incoming(env);
        Ok(())
    }

    /// Explicitly register a client channel (the only way to add clients
    /// in individual routing mode). Returns the existing channel when the
    /// identity is already tracked.
    pub fn register_client(&self, client_id: &str) -> Result<Channel> {
        let mut created = false;
        let channel = {
            let mut clients = self.inner.write_clients();
            if let Some(entry) = clients.get(client_id) {
                entry.channel.clone()
            } else {
                if clients.len() >= self.inner.config.max_clients {
                    return Err(ChannelError::ClientLimitReached(clients.len()));
                }
                let entry = self.inner.make_entry(client_id);
                let channel = entry.channel.clone();
                clients.insert(client_id.to_string(), entry);
                created = true;
                channel
            }
        };

        if created {
            global_metrics().client_connected();
            debug!(client_id, "Client registered");
            self.inner
                .events
                .emit(&Event::new(EventKind::Connect).with_client_id(client_id));
        }
        Ok(channel)
    }

    /// Remove a client and destroy its channel. Returns whether the
    /// identity was tracked.
    pub fn disconnect_client(&self, client_id: &str) -> bool {
        let entry = self.inner.write_clients().remove(client_id);
        match entry {
            Some(entry) => {
                global_metrics().client_disconnected();
                entry.channel.destroy();
                self.inner
                    .events
                    .emit(&Event::new(EventKind::Disconnect).with_client_id(client_id));
                true
            }
            None => false,
        }
    }

    /// Register a handler on every current and future client channel.
    pub fn subscribe_global<F, Fut>(&self, cmd: &str, f: F) -> Result<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.subscribe_global_handler(cmd, into_handler(f))
    }

    /// Boxed-handler variant of [`subscribe_global`](Self::subscribe_global).
    pub fn subscribe_global_handler(&self, cmd: &str, handler: Handler) -> Result<()> {
        self.inner
            .global_handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(cmd.to_string(), Arc::clone(&handler));

        let channels: Vec<Channel> = self
            .inner
            .read_clients()
            .values()
            .map(|entry| entry.channel.clone())
            .collect();
        for channel in channels {
            // A client destroyed but not yet swept must not abort the rest
            if channel.is_destroyed() {
                continue;
            }
            channel.subscribe_handler(cmd, Arc::clone(&handler))?;
        }
        Ok(())
    }

    /// Broadcast to every tracked client except an optional excluded
    /// sender. Returns the number of clients actually reached; a failed
    /// delivery is counted as zero for that client and never surfaces to
    /// the others.
    pub fn broadcast_to_all(&self, cmd: &str, payload: Value, exclude: Option<&str>) -> usize {
        self.fan_out(cmd, payload, exclude, |_| true)
    }

    /// Broadcast restricted to clients whose `app_type` tag matches.
    pub fn broadcast_to_type(
        &self,
        app_type: &str,
        cmd: &str,
        payload: Value,
        exclude: Option<&str>,
    ) -> usize {
        self.fan_out(cmd, payload, exclude, |meta| {
            meta.app_type.as_deref() == Some(app_type)
        })
    }

    fn fan_out<P>(&self, cmd: &str, payload: Value, exclude: Option<&str>, predicate: P) -> usize
    where
        P: Fn(&ClientMeta) -> bool,
    {
        // Snapshot first: each delivery is independent and none of them
        // runs under the client-map lock.
        let targets: Vec<(String, Channel)> = self
            .inner
            .read_clients()
            .values()
            .filter(|entry| predicate(&entry.meta))
            .map(|entry| (entry.meta.client_id.clone(), entry.channel.clone()))
            .collect();

        let mut reached = 0;
        for (client_id, channel) in targets {
            if exclude == Some(client_id.as_str()) {
                continue;
            }
            match channel.broadcast(cmd, payload.clone()) {
                Ok(()) => reached += 1,
                Err(e) => {
                    debug!(client_id = %client_id, error = %e, "Broadcast delivery failed")
                }
            }
        }
        reached
    }

    /// Channel for one tracked client
    pub fn channel(&self, client_id: &str) -> Option<Channel> {
        self.inner
            .read_clients()
            .get(client_id)
            .map(|entry| entry.channel.clone())
    }

    /// Metadata snapshot for one tracked client
    pub fn client_meta(&self, client_id: &str) -> Option<ClientMeta> {
        self.inner
            .read_clients()
            .get(client_id)
            .map(|entry| entry.meta.clone())
    }

    /// Metadata snapshot of every tracked client
    pub fn clients(&self) -> Vec<ClientMeta> {
        self.inner
            .read_clients()
            .values()
            .map(|entry| entry.meta.clone())
            .collect()
    }

    pub fn client_count(&self) -> usize {
        self.inner.read_clients().len()
    }

    /// Run one cleanup sweep immediately, outside the periodic schedule.
    pub fn sweep_now(&self) {
        self.inner.sweep_stale();
    }

    /// Lifecycle bus for connect/disconnect notifications
    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.inner.config.routing_mode
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("clients", &self.client_count())
            .field("routing_mode", &self.inner.config.routing_mode)
            .finish_non_exhaustive()
    }
}
