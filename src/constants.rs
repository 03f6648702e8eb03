//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name the controller reports itself as (event source, field manager, logs)
pub const CONTROLLER_NAME: &str = "annotation-controller";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default number of worker loops pulling from the work queue
pub const DEFAULT_WORKERS: usize = 2;

/// Default time allowed for the local cache to complete its initial listing (seconds)
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 60;

/// Default interval between cache-sync readiness probes (milliseconds)
pub const DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS: u64 = 100;

/// Default per-key backoff after the first failure (milliseconds)
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 5;

/// Default per-key backoff ceiling (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 1000;

/// Default overall requeue rate (tokens per second)
pub const DEFAULT_RATE_LIMIT_QPS: f64 = 10.0;

/// Default overall requeue burst size
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 100;

/// Default retry cap per key (0 means retry until the key succeeds)
pub const DEFAULT_MAX_RETRIES: u32 = 0;

/// Event reason recorded after every target of a record was applied
pub const REASON_SYNCED: &str = "Synced";

/// Event message recorded after every target of a record was applied
pub const MESSAGE_SYNCED: &str = "Annotation synced successfully";

/// Event reason recorded for a target whose kind has no registered handler
pub const REASON_UNKNOWN_TARGET_KIND: &str = "UnknownTargetKind";

/// Event reason recorded when a sync fails and the key is requeued
pub const REASON_SYNC_FAILED: &str = "SyncFailed";
