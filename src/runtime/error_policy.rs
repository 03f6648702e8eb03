//! # Error Policy
//!
//! Decides what happens to a key after a sync: forget it, requeue it with
//! rate-limited backoff, or give up on it.

use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::{ReconcilerError, SyncOutcome};
use crate::observability::metrics;
use tracing::{debug, error, warn};

/// What the error policy did with a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueDecision {
    /// Sync succeeded; backoff history cleared
    Forget,
    /// Sync failed permanently; key dropped
    Drop,
    /// Sync failed transiently; key requeued after its backoff delay
    RateLimited,
    /// Sync kept failing past the retry cap; key dropped
    GiveUp,
}

/// Apply the outcome of one sync to the queue
///
/// `max_retries == 0` means a transiently failing key is retried until it
/// succeeds.
pub fn handle_sync_result(
    queue: &WorkQueue,
    key: &str,
    result: &Result<SyncOutcome, ReconcilerError>,
    max_retries: u32,
) -> RequeueDecision {
    let error = match result {
        Ok(outcome) => {
            debug!(resource.key = key, outcome = ?outcome, "sync.succeeded");
            queue.forget(key);
            return RequeueDecision::Forget;
        }
        Err(error) => error,
    };

    metrics::increment_sync_errors();

    if !error.is_retryable() {
        error!(resource.key = key, error = %error, "Dropping key after non-retryable sync error");
        queue.forget(key);
        return RequeueDecision::Drop;
    }

    let retries = queue.num_requeues(key);
    if max_retries > 0 && retries >= max_retries {
        error!(
            resource.key = key,
            retries,
            error = %error,
            "Dropping key after exhausting retries"
        );
        queue.forget(key);
        return RequeueDecision::GiveUp;
    }

    warn!(
        resource.key = key,
        retries,
        error = %error,
        "Sync failed, requeueing with backoff"
    );
    queue.add_rate_limited(key);
    RequeueDecision::RateLimited
}
