//! Lifecycle Event Bus
//!
//! In-process notification of connect/disconnect/ready/error events to any
//! number of listeners. Emission is synchronous and runs listeners in
//! registration order; a panicking listener is isolated so the remaining
//! listeners still run.
//!
//! Listener ids are monotonic, which makes iteration order equal to
//! registration order and removal a direct keyed delete.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// Lifecycle event categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new client/peer was first seen
    Connect,
    /// The peer signaled readiness to receive
    Ready,
    /// A client/peer was removed or the channel was destroyed
    Disconnect,
    /// A non-fatal protocol error (validation drop, transport failure)
    Error,
}

/// One lifecycle notification
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    /// Client identity, when the event concerns a hub-tracked client
    pub client_id: Option<String>,
    /// Human-readable context
    pub detail: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            client_id: None,
            detail: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

type Listener = std::sync::Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by [`EventEmitter::on`], used to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId {
    kind: EventKind,
    id: u64,
}

/// Synchronous fan-out bus for lifecycle events
pub struct EventEmitter {
    listeners: Mutex<HashMap<EventKind, BTreeMap<u64, Listener>>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener for one event kind. Returns a handle for `off`.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners
            .entry(kind)
            .or_default()
            .insert(id, std::sync::Arc::new(listener));
        ListenerId { kind, id }
    }

    /// Deregister a listener. Removing an already-removed listener is a no-op.
    pub fn off(&self, listener_id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners
            .get_mut(&listener_id.kind)
            .map(|per_kind| per_kind.remove(&listener_id.id).is_some())
            .unwrap_or(false)
    }

    /// Emit an event to every listener registered for its kind, in
    /// registration order. A panicking listener does not stop the rest.
    pub fn emit(&self, event: &Event) {
        let snapshot: Vec<Listener> = {
            let listeners = self
                .listeners
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            listeners
                .get(&event.kind)
                .map(|per_kind| per_kind.values().cloned().collect())
                .unwrap_or_default()
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                warn!(kind = ?event.kind, "Event listener panicked");
            }
        }
    }

    /// Number of listeners currently registered for a kind
    pub fn listener_count(&self, kind: EventKind) -> usize {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners.get(&kind).map(|m| m.len()).unwrap_or(0)
    }

    /// Remove every listener
    pub fn clear(&self) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners.clear();
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_emit_reaches_listener() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        emitter.on(EventKind::Connect, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&Event::new(EventKind::Connect));
        emitter.emit(&Event::new(EventKind::Connect));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_emission_in_registration_order() {
        let emitter = EventEmitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            emitter.on(EventKind::Ready, move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        emitter.emit(&Event::new(EventKind::Ready));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_off_removes_listener() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let id = emitter.on(EventKind::Disconnect, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(emitter.off(id));
        assert!(!emitter.off(id));

        emitter.emit(&Event::new(EventKind::Disconnect));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_the_rest() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));

        emitter.on(EventKind::Error, |_| panic!("boom"));
        let count_clone = count.clone();
        emitter.on(EventKind::Error, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&Event::new(EventKind::Error));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_only_sees_its_kind() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        emitter.on(EventKind::Connect, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&Event::new(EventKind::Disconnect));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.listener_count(EventKind::Connect), 1);
    }
}
