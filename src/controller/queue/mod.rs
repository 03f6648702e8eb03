//! # Work Queue
//!
//! Deduplicating, rate-limited queue of object keys.
//!
//! - `work_queue`: the queue with its dirty/processing bookkeeping and delayed adds
//! - `rate_limiter`: requeue delay policies

mod rate_limiter;
mod work_queue;

pub use rate_limiter::{
    controller_rate_limiter, default_controller_rate_limiter, BucketRateLimiter,
    ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter,
};
pub use work_queue::WorkQueue;
