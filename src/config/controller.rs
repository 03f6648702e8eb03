//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_or_default, env_var_or_default_str};
use crate::constants::{
    CONTROLLER_NAME, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_SECS,
    DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS, DEFAULT_CACHE_SYNC_TIMEOUT_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_RATE_LIMIT_BURST, DEFAULT_RATE_LIMIT_QPS, DEFAULT_WORKERS,
};
use std::time::Duration;
use tracing::warn;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Number of worker loops pulling keys from the work queue
    pub workers: usize,
    /// How long to wait for the local cache to finish its initial listing (seconds)
    pub cache_sync_timeout_secs: u64,
    /// Interval between cache-sync readiness probes (milliseconds)
    pub cache_sync_poll_interval_ms: u64,
    /// Per-key backoff after the first failure (milliseconds), doubled on each further failure
    pub backoff_base_ms: u64,
    /// Per-key backoff ceiling (seconds)
    pub backoff_max_secs: u64,
    /// Overall requeue rate shared by all keys (tokens per second)
    pub rate_limit_qps: f64,
    /// Overall requeue burst size
    pub rate_limit_burst: u32,
    /// Give up on a key after this many consecutive failures (0 = never give up)
    pub max_retries: u32,
    /// Namespace to watch for Annotation resources (empty = all namespaces)
    pub watch_namespace: String,
    /// Name reported as the event source
    pub controller_name: String,
    /// Instance reported alongside the event source (usually the pod name)
    pub instance: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            cache_sync_timeout_secs: DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            cache_sync_poll_interval_ms: DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            rate_limit_qps: DEFAULT_RATE_LIMIT_QPS,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            max_retries: DEFAULT_MAX_RETRIES,
            watch_namespace: String::new(),
            controller_name: CONTROLLER_NAME.to_string(),
            instance: None,
        }
    }
}

/// Requeue rate must be a finite, positive number of tokens per second
fn positive_qps_or_default(qps: f64) -> f64 {
    if qps.is_finite() && qps > 0.0 {
        qps
    } else {
        warn!(qps, default = DEFAULT_RATE_LIMIT_QPS, "Ignoring invalid RATE_LIMIT_QPS");
        DEFAULT_RATE_LIMIT_QPS
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            workers: env_var_or_default("WORKERS", DEFAULT_WORKERS),
            cache_sync_timeout_secs: env_var_or_default(
                "CACHE_SYNC_TIMEOUT_SECS",
                DEFAULT_CACHE_SYNC_TIMEOUT_SECS,
            ),
            cache_sync_poll_interval_ms: env_var_or_default(
                "CACHE_SYNC_POLL_INTERVAL_MS",
                DEFAULT_CACHE_SYNC_POLL_INTERVAL_MS,
            ),
            backoff_base_ms: env_var_or_default("BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            rate_limit_qps: positive_qps_or_default(env_var_or_default(
                "RATE_LIMIT_QPS",
                DEFAULT_RATE_LIMIT_QPS,
            )),
            rate_limit_burst: env_var_or_default("RATE_LIMIT_BURST", DEFAULT_RATE_LIMIT_BURST),
            max_retries: env_var_or_default("MAX_RETRIES", DEFAULT_MAX_RETRIES),
            watch_namespace: env_var_or_default_str("WATCH_NAMESPACE", ""),
            controller_name: env_var_or_default_str("CONTROLLER_NAME", CONTROLLER_NAME),
            instance: std::env::var("POD_NAME").ok().filter(|v| !v.is_empty()),
        }
    }

    /// Get cache sync timeout duration
    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }

    /// Get cache sync poll interval duration
    pub fn cache_sync_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cache_sync_poll_interval_ms)
    }

    /// Get per-key backoff base duration
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    /// Get per-key backoff ceiling duration
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    /// Namespace to watch, `None` meaning all namespaces
    pub fn watch_namespace(&self) -> Option<&str> {
        Some(self.watch_namespace.as_str()).filter(|ns| !ns.is_empty())
    }
}
