//! # Controller
//!
//! Controller lifecycle and worker pool.
//!
//! ```text
//! Created -> WaitingForCacheSync -> Running -> ShuttingDown -> Stopped
//! ```
//!
//! [`Controller::run`] waits for the local cache to finish its initial
//! listing, starts the workers, and blocks until the cancellation token
//! fires. It then shuts the queue down, lets every in-flight sync finish,
//! and returns once all workers have exited.

use crate::config::ControllerConfig;
use crate::constants::{
    DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS, DEFAULT_CACHE_SYNC_TIMEOUT_SECS, DEFAULT_MAX_RETRIES,
};
use crate::controller::cache::wait_for_cache_sync;
use crate::controller::queue::WorkQueue;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::ServerState;
use crate::observability::metrics;
use crate::runtime::error_policy::handle_sync_result;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Created,
    WaitingForCacheSync,
    Running,
    ShuttingDown,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("controller has already been started")]
    AlreadyStarted,

    #[error("failed to wait for caches to sync")]
    CacheSyncFailed,
}

/// Work queue, sync handler and the workers connecting them
pub struct Controller {
    queue: WorkQueue,
    reconciler: Arc<Reconciler>,
    state: watch::Sender<ControllerState>,
    server_state: Option<Arc<ServerState>>,
    cache_sync_timeout: Duration,
    cache_sync_poll_interval: Duration,
    max_retries: u32,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &*self.state.borrow())
            .field("queue_len", &self.queue.len())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(queue: WorkQueue, reconciler: Reconciler) -> Self {
        let (state, _) = watch::channel(ControllerState::Created);
        Self {
            queue,
            reconciler: Arc::new(reconciler),
            state,
            server_state: None,
            cache_sync_timeout: Duration::from_secs(DEFAULT_CACHE_SYNC_TIMEOUT_SECS),
            cache_sync_poll_interval: Duration::from_millis(DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Take cache-sync and retry settings from `config`
    #[must_use]
    pub fn with_config(mut self, config: &ControllerConfig) -> Self {
        self.cache_sync_timeout = config.cache_sync_timeout();
        self.cache_sync_poll_interval = config.cache_sync_poll_interval();
        self.max_retries = config.max_retries;
        self
    }

    /// Report readiness through the probe server while running
    #[must_use]
    pub fn with_server_state(mut self, server_state: Arc<ServerState>) -> Self {
        self.server_state = Some(server_state);
        self
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    pub fn state(&self) -> ControllerState {
        *self.state.borrow()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.state.subscribe()
    }

    fn transition(&self, next: ControllerState) {
        let previous = self.state.send_replace(next);
        info!(from = ?previous, to = ?next, "controller.state");
        if let Some(server_state) = &self.server_state {
            server_state.set_ready(next == ControllerState::Running);
        }
    }

    /// Run `workers` worker loops until `cancel` fires
    ///
    /// Fails without starting any worker if `workers` is zero, if the
    /// controller was started before, or if the cache does not sync before
    /// the timeout or cancellation.
    pub async fn run(&self, workers: usize, cancel: CancellationToken) -> Result<(), ControllerError> {
        if workers == 0 {
            return Err(ControllerError::NoWorkers);
        }
        let started = self.state.send_if_modified(|state| {
            if *state == ControllerState::Created {
                *state = ControllerState::WaitingForCacheSync;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(ControllerError::AlreadyStarted);
        }

        info!("Waiting for informer caches to sync");
        let reconciler = Arc::clone(&self.reconciler);
        let synced = tokio::time::timeout(
            self.cache_sync_timeout,
            wait_for_cache_sync(
                || reconciler.has_synced(),
                self.cache_sync_poll_interval,
                &cancel,
            ),
        )
        .await
        .unwrap_or(false);

        if !synced {
            error!(
                timeout_secs = self.cache_sync_timeout.as_secs(),
                cancelled = cancel.is_cancelled(),
                "Caches did not sync"
            );
            self.queue.shutdown();
            self.transition(ControllerState::Stopped);
            return Err(ControllerError::CacheSyncFailed);
        }

        info!(workers, "Starting workers");
        let mut pool = JoinSet::new();
        for worker in 0..workers {
            self.spawn_worker(&mut pool, worker);
        }
        self.transition(ControllerState::Running);

        // A worker whose sync panicked is replaced until shutdown
        let mut next_worker = workers;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(joined) = pool.join_next() => {
                    if let Err(e) = joined {
                        error!(error = %e, worker = next_worker, "Worker exited abnormally, restarting");
                        self.spawn_worker(&mut pool, next_worker);
                        next_worker += 1;
                    }
                }
            }
        }

        info!("Shutting down workers");
        self.transition(ControllerState::ShuttingDown);
        self.queue.shutdown();
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker exited abnormally");
            }
        }

        self.transition(ControllerState::Stopped);
        info!("Controller stopped");
        Ok(())
    }

    fn spawn_worker(&self, pool: &mut JoinSet<()>, worker: usize) {
        let queue = self.queue.clone();
        let reconciler = Arc::clone(&self.reconciler);
        let max_retries = self.max_retries;
        pool.spawn(
            async move {
                while process_next_work_item(&queue, &reconciler, max_retries).await {}
            }
            .instrument(info_span!("controller.worker", worker)),
        );
    }
}

/// Releases a key handed out by the queue when dropped, so a panicking sync
/// cannot leave the key marked in-flight forever
struct InFlight<'a> {
    queue: &'a WorkQueue,
    key: &'a str,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

/// Take one key from the queue, sync it and apply the error policy
///
/// Returns `false` once the queue has shut down and drained.
pub async fn process_next_work_item(
    queue: &WorkQueue,
    reconciler: &Reconciler,
    max_retries: u32,
) -> bool {
    let Some(key) = queue.get().await else {
        return false;
    };
    let _in_flight = InFlight { queue, key: &key };

    let start = Instant::now();
    metrics::increment_syncs();
    let result = reconciler
        .sync(&key)
        .instrument(info_span!("controller.sync", resource.key = %key))
        .await;
    metrics::observe_sync_duration(start.elapsed().as_secs_f64());

    handle_sync_result(queue, &key, &result, max_retries);
    true
}
