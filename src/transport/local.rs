//! In-Process Transport
//!
//! Links two endpoints living in the same process over unbounded channels.
//! This is the transport used by the test suite and by embedders that run
//! both halves of a conversation in one runtime (e.g. a host page and a
//! simulated frame).

use crate::core::envelope::MessageEnvelope;
use crate::error::{ChannelError, Result};
use crate::protocol::channel::Channel;
use crate::transport::{HubTransport, Transport};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// One half of an in-process transport pair.
pub struct LocalEndpoint {
    tx: mpsc::UnboundedSender<MessageEnvelope>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<MessageEnvelope>>>,
}

impl LocalEndpoint {
    /// Create two linked endpoints: whatever one sends, the other receives.
    pub fn pair() -> (Arc<LocalEndpoint>, Arc<LocalEndpoint>) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();

        let a = Arc::new(LocalEndpoint {
            tx: a_tx,
            rx: Mutex::new(Some(a_rx)),
        });
        let b = Arc::new(LocalEndpoint {
            tx: b_tx,
            rx: Mutex::new(Some(b_rx)),
        });
        (a, b)
    }

    /// Take the inbound receiver. Each endpoint yields it once.
    pub fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<MessageEnvelope>> {
        self.rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Spawn a task forwarding this endpoint's inbound envelopes into a
    /// channel. The task ends when the peer endpoint is dropped.
    pub fn pump(&self, channel: Channel) -> Option<JoinHandle<()>> {
        let mut rx = self.take_inbound()?;
        Some(tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                trace!("Local endpoint delivering inbound envelope");
                channel.handle_incoming(envelope);
            }
        }))
    }
}

impl Transport for LocalEndpoint {
    fn send(&self, envelope: MessageEnvelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| ChannelError::TransportClosed)
    }
}

impl std::fmt::Debug for LocalEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEndpoint").finish_non_exhaustive()
    }
}

/// In-process multi-client transport: the hub side of one shared physical
/// endpoint, with a per-client outbound queue on the other side.
pub struct LocalHubTransport {
    clients: Mutex<HashMap<String, mpsc::UnboundedSender<MessageEnvelope>>>,
}

impl LocalHubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            clients: Mutex::new(HashMap::new()),
        })
    }

    /// Register a client endpoint and get the receiver carrying envelopes
    /// the hub sends to it.
    pub fn register(&self, client_id: &str) -> mpsc::UnboundedReceiver<MessageEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(client_id.to_string(), tx);
        rx
    }

    /// Drop a client endpoint; later sends to it fail.
    pub fn unregister(&self, client_id: &str) {
        self.clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(client_id);
    }
}

impl HubTransport for LocalHubTransport {
    fn send_to(&self, client_id: &str, envelope: MessageEnvelope) -> Result<()> {
        let clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = clients
            .get(client_id)
            .ok_or_else(|| ChannelError::UnknownClient(client_id.to_string()))?;
        tx.send(envelope).map_err(|_| ChannelError::TransportClosed)
    }
}

impl std::fmt::Debug for LocalHubTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalHubTransport").finish_non_exhaustive()
    }
}
