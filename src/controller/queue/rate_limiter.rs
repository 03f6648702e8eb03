//! # Rate Limiters
//!
//! Decide how long a key waits before it is handed out again after a failed sync.
//!
//! - [`ItemExponentialFailureRateLimiter`]: per-key delay that doubles with every
//!   consecutive failure of that key, capped at a ceiling, and resets on `forget`.
//! - [`BucketRateLimiter`]: a token bucket shared by every key, bounding the
//!   overall requeue rate.
//! - [`MaxOfRateLimiter`]: combines limiters and uses the longest delay.
//!
//! ```rust
//! use annotation_controller::controller::queue::{ItemExponentialFailureRateLimiter, RateLimiter};
//! use std::time::Duration;
//!
//! let limiter = ItemExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1));
//! assert_eq!(limiter.when("team-a/policy1"), Duration::from_millis(5));
//! assert_eq!(limiter.when("team-a/policy1"), Duration::from_millis(10));
//! limiter.forget("team-a/policy1");
//! assert_eq!(limiter.when("team-a/policy1"), Duration::from_millis(5));
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Decides the requeue delay for a key
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Delay before `key` may be processed again; records one more failure
    fn when(&self, key: &str) -> Duration;

    /// Clear any failure history for `key`
    fn forget(&self, key: &str);

    /// Number of failures recorded for `key` since it was last forgotten
    fn num_requeues(&self, key: &str) -> u32;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`
#[derive(Debug)]
pub struct ItemExponentialFailureRateLimiter {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl ItemExponentialFailureRateLimiter {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for ItemExponentialFailureRateLimiter {
    fn when(&self, key: &str) -> Duration {
        let exponent = {
            let mut failures = lock(&self.failures);
            let count = failures.entry(key.to_string()).or_insert(0);
            let exponent = *count;
            *count = count.saturating_add(1);
            exponent
        };

        1u32.checked_shl(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    fn forget(&self, key: &str) {
        lock(&self.failures).remove(key);
    }

    fn num_requeues(&self, key: &str) -> u32 {
        lock(&self.failures).get(key).copied().unwrap_or(0)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket shared by all keys
///
/// Each call to `when` takes one token. Once the bucket is empty, callers are
/// told to wait until their token would have been refilled.
#[derive(Debug)]
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    #[must_use]
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst);
        Self {
            qps,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last_refill: Instant::now(),
            }),
        }
    }
}

impl RateLimiter for BucketRateLimiter {
    fn when(&self, _key: &str) -> Duration {
        if !self.qps.is_finite() || self.qps <= 0.0 {
            return Duration::ZERO;
        }

        let mut bucket = lock(&self.bucket);
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.last_refill = now;
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::try_from_secs_f64(-bucket.tokens / self.qps).unwrap_or(Duration::MAX)
        }
    }

    fn forget(&self, _key: &str) {}

    fn num_requeues(&self, _key: &str) -> u32 {
        0
    }
}

/// Uses the longest delay reported by any member limiter
#[derive(Debug)]
pub struct MaxOfRateLimiter {
    limiters: Vec<Box<dyn RateLimiter>>,
}

impl MaxOfRateLimiter {
    #[must_use]
    pub fn new(limiters: Vec<Box<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOfRateLimiter {
    fn when(&self, key: &str) -> Duration {
        self.limiters
            .iter()
            .map(|limiter| limiter.when(key))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, key: &str) {
        for limiter in &self.limiters {
            limiter.forget(key);
        }
    }

    fn num_requeues(&self, key: &str) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Per-key exponential backoff combined with an overall token bucket
#[must_use]
pub fn controller_rate_limiter(
    base: Duration,
    max: Duration,
    qps: f64,
    burst: u32,
) -> MaxOfRateLimiter {
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::new(base, max)),
        Box::new(BucketRateLimiter::new(qps, burst)),
    ])
}

/// 5ms doubling up to 1000s per key, and 10 requeues per second (burst 100) overall
#[must_use]
pub fn default_controller_rate_limiter() -> MaxOfRateLimiter {
    use crate::constants::{
        DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_MAX_SECS, DEFAULT_RATE_LIMIT_BURST,
        DEFAULT_RATE_LIMIT_QPS,
    };
    controller_rate_limiter(
        Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        Duration::from_secs(DEFAULT_BACKOFF_MAX_SECS),
        DEFAULT_RATE_LIMIT_QPS,
        DEFAULT_RATE_LIMIT_BURST,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_sequence() {
        let limiter =
            ItemExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1));

        assert_eq!(limiter.when("a"), Duration::from_millis(5));
        assert_eq!(limiter.when("a"), Duration::from_millis(10));
        assert_eq!(limiter.when("a"), Duration::from_millis(20));
        assert_eq!(limiter.when("a"), Duration::from_millis(40));
        assert_eq!(limiter.num_requeues("a"), 4);
    }

    #[test]
    fn test_exponential_max_cap() {
        let limiter =
            ItemExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1));

        for _ in 0..8 {
            limiter.when("a");
        }
        // 5ms * 2^8 = 1.28s, capped
        assert_eq!(limiter.when("a"), Duration::from_secs(1));

        // Shift overflow must still cap rather than wrap
        for _ in 0..64 {
            assert_eq!(limiter.when("a"), Duration::from_secs(1));
        }
    }

    #[test]
    fn test_exponential_forget_resets() {
        let limiter =
            ItemExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1));

        let first = limiter.when("a");
        let second = limiter.when("a");
        let third = limiter.when("a");
        assert!(first <= second && second <= third);

        limiter.forget("a");
        assert_eq!(limiter.num_requeues("a"), 0);
        assert_eq!(limiter.when("a"), Duration::from_millis(5));
    }

    #[test]
    fn test_exponential_per_key_state() {
        let limiter =
            ItemExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1));

        limiter.when("a");
        limiter.when("a");
        limiter.when("a");

        // Independent key starts fresh
        assert_eq!(limiter.when("b"), Duration::from_millis(5));

        limiter.forget("a");
        // Forgetting one key leaves the other untouched
        assert_eq!(limiter.when("b"), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_burst_then_throttle() {
        let limiter = BucketRateLimiter::new(10.0, 2);

        assert_eq!(limiter.when("a"), Duration::ZERO);
        assert_eq!(limiter.when("b"), Duration::ZERO);
        // Bucket empty: the next token arrives after 1/qps
        let wait = limiter.when("c");
        assert!(wait > Duration::from_millis(99) && wait <= Duration::from_millis(101));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(limiter.when("d"), Duration::ZERO);
    }

    #[test]
    fn test_bucket_zero_qps_is_unlimited() {
        let limiter = BucketRateLimiter::new(0.0, 0);
        assert_eq!(limiter.when("a"), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_extreme_qps_does_not_panic() {
        assert_eq!(BucketRateLimiter::new(f64::NAN, 0).when("a"), Duration::ZERO);
        assert_eq!(BucketRateLimiter::new(f64::INFINITY, 0).when("a"), Duration::ZERO);

        let tiny = BucketRateLimiter::new(f64::MIN_POSITIVE, 0);
        assert_eq!(tiny.when("a"), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_of_uses_longest_delay() {
        let limiter = controller_rate_limiter(
            Duration::from_millis(5),
            Duration::from_secs(1000),
            10.0,
            100,
        );

        assert_eq!(limiter.when("a"), Duration::from_millis(5));
        assert_eq!(limiter.when("a"), Duration::from_millis(10));
        assert_eq!(limiter.num_requeues("a"), 2);

        limiter.forget("a");
        assert_eq!(limiter.num_requeues("a"), 0);
    }
}
