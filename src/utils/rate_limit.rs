//! Sliding-Window Rate Limiter
//!
//! Caps the outbound envelope rate of one channel. The limiter tracks the
//! instants of recent acquisitions in a FIFO queue and expires entries
//! falling outside the window on every check, so memory stays bounded by
//! the configured limit.
//!
//! Denial is a caller-visible backpressure signal: `publish` fails fast
//! with a rate-limit error instead of delaying the send. Responses to
//! already-accepted requests bypass the limiter entirely.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default window over which the limit applies
const WINDOW: Duration = Duration::from_secs(1);

/// Sliding-window counter with O(1) expiry per acquisition
#[derive(Debug)]
pub struct RateLimiter {
    /// Instants of acquisitions still inside the window
    hits: VecDeque<Instant>,
    /// Maximum acquisitions per window
    limit: u32,
    /// Window length
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` acquisitions per second
    pub fn new(limit: u32) -> Self {
        Self::with_window(limit, WINDOW)
    }

    /// Create a limiter with a custom window
    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            hits: VecDeque::with_capacity(limit as usize),
            limit,
            window,
        }
    }

    /// Try to acquire one send slot. Returns false when the window is full.
    pub fn try_acquire(&mut self) -> bool {
        let now = Instant::now();

        while let Some(front) = self.hits.front() {
            if now.duration_since(*front) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }

        if self.hits.len() < self.limit as usize {
            self.hits.push_back(now);
            true
        } else {
            debug!(limit = self.limit, "Rate limit window full");
            false
        }
    }

    /// Number of slots still available in the current window
    pub fn available(&self) -> u32 {
        self.limit.saturating_sub(self.hits.len() as u32)
    }

    /// Configured limit per window
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Forget all recorded acquisitions
    pub fn reset(&mut self) {
        self.hits.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_allows_up_to_limit() {
        let mut limiter = RateLimiter::new(3);
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn test_window_expiry_frees_slots() {
        let mut limiter = RateLimiter::with_window(2, Duration::from_millis(20));
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        thread::sleep(Duration::from_millis(30));

        assert!(limiter.try_acquire());
    }

    #[test]
    fn test_available_counts_down() {
        let mut limiter = RateLimiter::new(5);
        assert_eq!(limiter.available(), 5);
        limiter.try_acquire();
        limiter.try_acquire();
        assert_eq!(limiter.available(), 3);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        limiter.reset();
        assert!(limiter.try_acquire());
    }
}
