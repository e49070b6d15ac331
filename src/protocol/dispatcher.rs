//! Command dispatch tables.
//!
//! Maps command names to handlers: one handler per name, last registration
//! wins. Request handlers are async and produce the response payload (or a
//! failure message); broadcast handlers share the same shape but their
//! return value is discarded.

use crate::error::{constants, ChannelError, Result};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// What a handler produces: the success payload, or a failure message that
/// becomes a handler-error response.
pub type HandlerResult = std::result::Result<Value, String>;

/// Type-erased async handler invoked for a matching inbound command.
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Box an async closure into a [`Handler`].
pub fn into_handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |payload| Box::pin(f(payload)))
}

/// Registry mapping command names to handlers, with separate tables for
/// request/response commands and one-way broadcasts.
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<String, Handler>>>,
    broadcast_handlers: Arc<RwLock<HashMap<String, Handler>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
            broadcast_handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a request handler. Replaces any previous handler for the
    /// same command.
    pub fn register(&self, cmd: &str, handler: Handler) -> Result<()> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ChannelError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        handlers.insert(cmd.to_string(), handler);
        Ok(())
    }

    /// Remove a request handler. Returns whether one was registered.
    pub fn unregister(&self, cmd: &str) -> Result<bool> {
        let mut handlers = self
            .handlers
            .write()
            .map_err(|_| ChannelError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        Ok(handlers.remove(cmd).is_some())
    }

    /// Look up the request handler for a command.
    pub fn lookup(&self, cmd: &str) -> Result<Option<Handler>> {
        let handlers = self
            .handlers
            .read()
            .map_err(|_| ChannelError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string()))?;

        Ok(handlers.get(cmd).cloned())
    }

    /// Register a broadcast handler. Replaces any previous handler for the
    /// same command.
    pub fn register_broadcast(&self, cmd: &str, handler: Handler) -> Result<()> {
        let mut handlers = self
            .broadcast_handlers
            .write()
            .map_err(|_| ChannelError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string()))?;

        handlers.insert(cmd.to_string(), handler);
        Ok(())
    }

    /// Look up the broadcast handler for a command.
    pub fn lookup_broadcast(&self, cmd: &str) -> Result<Option<Handler>> {
        let handlers = self
            .broadcast_handlers
            .read()
            .map_err(|_| ChannelError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string()))?;

        Ok(handlers.get(cmd).cloned())
    }

    /// Drop every registration. Used on channel destruction.
    pub fn clear(&self) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.clear();
        }
        if let Ok(mut handlers) = self.broadcast_handlers.write() {
            handlers.clear();
        }
    }

    /// Number of registered request handlers
    pub fn len(&self) -> usize {
        self.handlers.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_lookup() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .register("echo", into_handler(|payload| async move { Ok(payload) }))
            .unwrap();

        let handler = dispatcher.lookup("echo").unwrap().expect("registered");
        let result = handler(json!({"k": 1})).await;
        assert_eq!(result, Ok(json!({"k": 1})));

        assert!(dispatcher.lookup("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .register("version", into_handler(|_| async { Ok(json!(1)) }))
            .unwrap();
        dispatcher
            .register("version", into_handler(|_| async { Ok(json!(2)) }))
            .unwrap();

        let handler = dispatcher.lookup("version").unwrap().expect("registered");
        assert_eq!(handler(Value::Null).await, Ok(json!(2)));
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn test_unregister() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .register("x", into_handler(|_| async { Ok(Value::Null) }))
            .unwrap();

        assert!(dispatcher.unregister("x").unwrap());
        assert!(!dispatcher.unregister("x").unwrap());
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_broadcast_table_is_separate() {
        let dispatcher = Dispatcher::new();
        dispatcher
            .register_broadcast("tick", into_handler(|_| async { Ok(Value::Null) }))
            .unwrap();

        assert!(dispatcher.lookup("tick").unwrap().is_none());
        assert!(dispatcher.lookup_broadcast("tick").unwrap().is_some());
    }
}
