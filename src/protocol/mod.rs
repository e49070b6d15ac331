//! # Protocol Engine
//!
//! The concurrency-sensitive heart of the crate: envelope correlation,
//! readiness handshake, command dispatch, deadline enforcement, and the
//! validation boundary.

pub mod channel;
pub mod dispatcher;
pub mod handshake;
pub mod timeout;
pub mod validator;


pub use channel::Channel;
pub use dispatcher::{into_handler, Dispatcher, Handler, HandlerResult};
pub use timeout::{TimeoutHandle, TimeoutManager};
