//! Observability and Metrics
//!
//! This module provides metrics collection and observability features
//! for monitoring channel and hub health.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for channel operations
#[derive(Debug)]
pub struct Metrics {
    /// Total requests published
    pub requests_sent: AtomicU64,
    /// Total responses received and matched to a pending request
    pub responses_received: AtomicU64,
    /// Total responses sent back to requesters
    pub responses_sent: AtomicU64,
    /// Total broadcasts sent
    pub broadcasts_sent: AtomicU64,
    /// Total requests that timed out
    pub timeouts_total: AtomicU64,
    /// Total sends denied by the rate limiter
    pub rate_limited_total: AtomicU64,
    /// Total requests answered with no-handler
    pub no_handler_total: AtomicU64,
    /// Total handler failures (error returns and panics)
    pub handler_errors_total: AtomicU64,
    /// Total inbound envelopes dropped by validation
    pub validation_failures: AtomicU64,
    /// Total unmatched (late or foreign) responses dropped
    pub unmatched_responses: AtomicU64,
    /// Total envelopes flushed from readiness queues
    pub queue_flushed: AtomicU64,
    /// Total payload bytes sent
    pub bytes_sent: AtomicU64,
    /// Total payload bytes received
    pub bytes_received: AtomicU64,
    /// Total clients ever tracked by a hub
    pub clients_connected: AtomicU64,
    /// Currently tracked clients
    pub clients_active: AtomicU64,
    /// Clients removed by the cleanup sweep
    pub clients_evicted: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            requests_sent: AtomicU64::new(0),
            responses_received: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            broadcasts_sent: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
            rate_limited_total: AtomicU64::new(0),
            no_handler_total: AtomicU64::new(0),
            handler_errors_total: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            unmatched_responses: AtomicU64::new(0),
            queue_flushed: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            clients_connected: AtomicU64::new(0),
            clients_active: AtomicU64::new(0),
            clients_evicted: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a published request
    pub fn request_sent(&self, byte_count: u64) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a matched response
    pub fn response_received(&self, byte_count: u64) {
        self.responses_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a response sent back to a requester
    pub fn response_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a broadcast send
    pub fn broadcast_sent(&self, byte_count: u64) {
        self.broadcasts_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record a request timeout
    pub fn request_timed_out(&self) {
        self.timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rate limit denial
    pub fn rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a no-handler response
    pub fn no_handler(&self) {
        self.no_handler_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a handler failure
    pub fn handler_error(&self) {
        self.handler_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an envelope dropped by validation
    pub fn validation_failure(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an unmatched response drop
    pub fn unmatched_response(&self) {
        self.unmatched_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record envelopes flushed after readiness
    pub fn queue_flush(&self, count: u64) {
        self.queue_flushed.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a new tracked client
    pub fn client_connected(&self) {
        self.clients_connected.fetch_add(1, Ordering::Relaxed);
        self.clients_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a client removal
    pub fn client_disconnected(&self) {
        self.clients_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a stale-client eviction
    pub fn client_evicted(&self) {
        self.clients_evicted.fetch_add(1, Ordering::Relaxed);
        self.clients_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            responses_sent: self.responses_sent.load(Ordering::Relaxed),
            broadcasts_sent: self.broadcasts_sent.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
            rate_limited_total: self.rate_limited_total.load(Ordering::Relaxed),
            no_handler_total: self.no_handler_total.load(Ordering::Relaxed),
            handler_errors_total: self.handler_errors_total.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            unmatched_responses: self.unmatched_responses.load(Ordering::Relaxed),
            queue_flushed: self.queue_flushed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            clients_connected: self.clients_connected.load(Ordering::Relaxed),
            clients_active: self.clients_active.load(Ordering::Relaxed),
            clients_evicted: self.clients_evicted.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            requests_sent = snapshot.requests_sent,
            responses_received = snapshot.responses_received,
            responses_sent = snapshot.responses_sent,
            broadcasts_sent = snapshot.broadcasts_sent,
            timeouts_total = snapshot.timeouts_total,
            rate_limited_total = snapshot.rate_limited_total,
            no_handler_total = snapshot.no_handler_total,
            handler_errors_total = snapshot.handler_errors_total,
            validation_failures = snapshot.validation_failures,
            unmatched_responses = snapshot.unmatched_responses,
            queue_flushed = snapshot.queue_flushed,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            clients_connected = snapshot.clients_connected,
            clients_active = snapshot.clients_active,
            clients_evicted = snapshot.clients_evicted,
            uptime_seconds = snapshot.uptime_seconds,
            "Channel metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub requests_sent: u64,
    pub responses_received: u64,
    pub responses_sent: u64,
    pub broadcasts_sent: u64,
    pub timeouts_total: u64,
    pub rate_limited_total: u64,
    pub no_handler_total: u64,
    pub handler_errors_total: u64,
    pub validation_failures: u64,
    pub unmatched_responses: u64,
    pub queue_flushed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub clients_connected: u64,
    pub clients_active: u64,
    pub clients_evicted: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance (lazy static for simplicity)
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
