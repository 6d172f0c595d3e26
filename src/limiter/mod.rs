//! In-memory token-bucket rate limiting.
//!
//! [`TokenBucket`] holds the quota for a single key and [`BucketRegistry`]
//! owns one bucket per key. Callers only ever hold the transient `Arc`
//! handed out by [`BucketRegistry::get_or_create`]; bucket counters are never
//! mutated outside the bucket's own lock.

use std::time::Duration;

mod registry;
mod token_bucket;

pub use registry::BucketRegistry;
pub use token_bucket::TokenBucket;

/// Quota applied to every bucket created by a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Maximum tokens a bucket may hold (burst size).
    pub capacity: u64,
    /// Tokens added per elapsed `refill_interval`.
    pub refill_rate: u64,
    pub refill_interval: Duration,
}

impl RateLimitPolicy {
    pub fn new(capacity: u64, refill_rate: u64, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_rate,
            refill_interval,
        }
    }
}

impl Default for RateLimitPolicy {
    /// 10 requests per minute with a burst of 10.
    fn default() -> Self {
        Self::new(10, 10, Duration::from_secs(60))
    }
}

/// Outcome of a consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumption {
    Admitted {
        remaining: u64,
    },
    /// Not enough tokens; `retry_after` is the time until the next refill.
    Rejected {
        retry_after: Duration,
    },
}

impl Consumption {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Consumption::Admitted { .. })
    }
}
