//! # Work Queue
//!
//! A FIFO of keys with set semantics.
//!
//! A key lives in at most one of two places at a time: queued (waiting for a
//! worker) or processing (handed out by [`WorkQueue::get`] and not yet
//! released by [`WorkQueue::done`]). Adding a key that is already queued is a
//! no-op. Adding a key that is being processed marks it dirty; `done` then
//! puts it back in the queue exactly once. This guarantees that no key is
//! ever processed by two workers at the same time.

use super::rate_limiter::{default_controller_rate_limiter, RateLimiter};
use crate::observability::metrics;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Ready time used when a delay does not fit in an `Instant` (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Default)]
struct QueueState {
    /// Keys ready to be handed out, in order
    queue: VecDeque<String>,
    /// Keys that need processing (queued, or re-added while processing)
    dirty: HashSet<String>,
    /// Keys currently held by a worker
    processing: HashSet<String>,
    /// Keys scheduled by `add_after`, with the instant they become ready
    waiting: HashMap<String, Instant>,
    shutting_down: bool,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<QueueState>,
    notify: Notify,
    rate_limiter: Box<dyn RateLimiter>,
}

/// Rate-limited work queue shared by the change notifier and the workers
///
/// Cloning is cheap; clones share the same queue.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(default_controller_rate_limiter())
    }
}

impl WorkQueue {
    /// Create a queue using `rate_limiter` for `add_rate_limited`
    pub fn new(rate_limiter: impl RateLimiter + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                rate_limiter: Box::new(rate_limiter),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` as needing processing
    ///
    /// Coalesces with an identical key that is already queued. If the key is
    /// being processed it is held back until `done` is called for it.
    /// Ignored once the queue is shutting down.
    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        {
            let mut state = self.lock();
            if state.shutting_down {
                trace!(resource.key = %key, "workqueue.add.ignored_shutdown");
                return;
            }
            if state.dirty.contains(&key) {
                trace!(resource.key = %key, "workqueue.add.coalesced");
                return;
            }

            metrics::increment_workqueue_adds();
            state.dirty.insert(key.clone());
            if state.processing.contains(&key) {
                debug!(resource.key = %key, "workqueue.add.deferred_in_flight");
                return;
            }

            state.queue.push_back(key);
            metrics::set_workqueue_depth(state.queue.len());
        }
        self.inner.notify.notify_one();
    }

    /// Add `key` once `delay` has elapsed
    ///
    /// If the key is already waiting, the earlier ready time wins.
    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let now = Instant::now();
        let ready_at = now
            .checked_add(delay)
            .unwrap_or_else(|| now + FAR_FUTURE);
        {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            if state
                .waiting
                .get(&key)
                .is_some_and(|existing| *existing <= ready_at)
            {
                return;
            }
            state.waiting.insert(key.clone(), ready_at);
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(ready_at).await;
            let due = {
                let mut state = queue.lock();
                if state.waiting.get(&key) == Some(&ready_at) {
                    state.waiting.remove(&key);
                    true
                } else {
                    false
                }
            };
            if due {
                queue.add(key);
            }
        });
    }

    /// Add `key` after the delay chosen by the rate limiter
    ///
    /// Each call counts as one more failure of `key`, so the delay grows until
    /// `forget` is called.
    pub fn add_rate_limited(&self, key: impl Into<String>) {
        let key = key.into();
        let delay = self.inner.rate_limiter.when(&key);
        metrics::increment_workqueue_retries();
        debug!(resource.key = %key, delay_ms = delay.as_millis(), "workqueue.add_rate_limited");
        self.add_after(key, delay);
    }

    /// Clear the backoff history of `key`
    ///
    /// Does not remove the key from the queue.
    pub fn forget(&self, key: &str) {
        self.inner.rate_limiter.forget(key);
    }

    /// Number of rate-limited requeues of `key` since it was last forgotten
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.inner.rate_limiter.num_requeues(key)
    }

    /// Wait for the next key
    ///
    /// Returns `None` once the queue is shutting down and every queued key has
    /// been handed out. Every `Some(key)` must be followed by exactly one
    /// `done(key)`.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    metrics::set_workqueue_depth(state.queue.len());
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release a key handed out by `get`
    ///
    /// If the key was added again while it was being processed it goes back
    /// into the queue.
    pub fn done(&self, key: &str) {
        let requeued = {
            let mut state = self.lock();
            state.processing.remove(key);
            if state.dirty.contains(key) {
                state.queue.push_back(key.to_string());
                metrics::set_workqueue_depth(state.queue.len());
                true
            } else {
                false
            }
        };

        if requeued {
            debug!(resource.key = %key, "workqueue.done.requeued_dirty");
            self.inner.notify.notify_one();
        }
    }

    /// Number of keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is currently held by a worker
    pub fn is_processing(&self, key: &str) -> bool {
        self.lock().processing.contains(key)
    }

    /// Stop accepting new keys and wake every waiting `get`
    ///
    /// Keys already queued are still handed out; keys being processed can
    /// still be released with `done`.
    pub fn shutdown(&self) {
        {
            let mut state = self.lock();
            state.shutting_down = true;
            state.waiting.clear();
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}
