//! # Utility Modules
//!
//! Supporting utilities for rate limiting, lifecycle events, logging, and
//! observability.
//!
//! ## Components
//! - **Rate Limit**: Sliding-window outbound rate cap per channel
//! - **Events**: Synchronous lifecycle bus (connect/disconnect/ready/error)
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe observability counters

pub mod events;
pub mod logging;
pub mod metrics;
pub mod rate_limit;

// Re-export public types for advanced users
pub use events::{Event, EventEmitter, EventKind, ListenerId};
pub use rate_limit::RateLimiter;
