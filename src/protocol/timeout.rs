//! Per-Request Deadline Enforcement
//!
//! Schedules and cancels deadline callbacks independently of transport
//! behavior. Each scheduled deadline runs its callback exactly once on
//! expiry; cancellation after expiry is a no-op, never an error.
//!
//! A cancellation racing with firing is safe by construction: both paths
//! contend on removing the entry from the task table, and only the winner
//! proceeds. The caller owning the pending-request table gets the same
//! first-writer-wins guarantee one level up.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::trace;

/// Handle identifying one scheduled deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutHandle {
    id: u64,
}

/// Deadline scheduler backed by tokio timer tasks.
#[derive(Debug)]
pub struct TimeoutManager {
    tasks: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    next_id: AtomicU64,
}

impl TimeoutManager {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Schedule `on_timeout` to run once after `after`. Must be called
    /// within a tokio runtime.
    pub fn schedule<F>(&self, after: Duration, on_timeout: F) -> TimeoutHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let tasks = Arc::clone(&self.tasks);

        // Hold the table lock across the spawn so the timer task cannot
        // observe the table before its own handle is registered.
        let mut table = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Whoever removes the entry first wins; a concurrent cancel
            // leaves nothing to remove and the callback never runs.
            let won = tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id)
                .is_some();
            if won {
                trace!(timeout_id = id, "Deadline fired");
                on_timeout();
            }
        });
        table.insert(id, task.abort_handle());
        drop(table);

        TimeoutHandle { id }
    }

    /// Cancel a scheduled deadline. No-op if it already fired or was
    /// cancelled before.
    pub fn cancel(&self, handle: TimeoutHandle) {
        let removed = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle.id);
        if let Some(abort) = removed {
            abort.abort();
            trace!(timeout_id = handle.id, "Deadline cancelled");
        }
    }

    /// Cancel every outstanding deadline. Used on channel destruction.
    pub fn cancel_all(&self) {
        let drained: Vec<AbortHandle> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain().map(|(_, abort)| abort).collect()
        };
        for abort in drained {
            abort.abort();
        }
    }

    /// Number of deadlines currently armed
    pub fn active(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_deadline_fires_once() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();

        manager.schedule(Duration::from_millis(10), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active(), 0);
    }

    #[tokio::test]
    async fn test_cancel_prevents_firing() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = fired.clone();

        let handle = manager.schedule(Duration::from_millis(10), move || {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        manager.cancel(handle);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(manager.active(), 0);
    }

    #[tokio::test]
    async fn test_cancel_after_expiry_is_noop() {
        let manager = TimeoutManager::new();
        let handle = manager.schedule(Duration::from_millis(5), || {});

        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.cancel(handle);
        manager.cancel(handle);
    }

    #[tokio::test]
    async fn test_cancel_all_clears_pending() {
        let manager = TimeoutManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let fired = fired.clone();
            manager.schedule(Duration::from_millis(20), move || {
                fired.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(manager.active(), 5);

        manager.cancel_all();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(manager.active(), 0);
    }
}
