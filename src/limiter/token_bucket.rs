use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::{Consumption, RateLimitPolicy};

/// A single counter-based limiter refilled lazily on every access.
#[derive(Debug)]
pub struct TokenBucket {
    policy: RateLimitPolicy,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// # Panics
    ///
    /// Panics if the policy has a zero capacity, refill rate or refill interval.
    pub fn new(policy: RateLimitPolicy) -> Self {
        assert!(policy.capacity > 0, "bucket capacity must be positive");
        assert!(policy.refill_rate > 0, "bucket refill rate must be positive");
        assert!(
            !policy.refill_interval.is_zero(),
            "bucket refill interval must be positive"
        );

        Self {
            policy,
            state: Mutex::new(BucketState {
                tokens: policy.capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Tries to take `n` tokens. Refill and consume happen under one lock, so
    /// concurrent callers never observe a half-applied update.
    pub fn try_consume(&self, n: u64) -> Consumption {
        let mut state = self.lock();
        let now = Instant::now();
        self.refill(&mut state, now);

        if state.tokens >= n {
            state.tokens -= n;
            Consumption::Admitted {
                remaining: state.tokens,
            }
        } else {
            Consumption::Rejected {
                retry_after: self.time_until_available(&state, n, now),
            }
        }
    }

    /// Tokens currently available, after applying any pending refill.
    pub fn available(&self) -> u64 {
        let mut state = self.lock();
        self.refill(&mut state, Instant::now());
        state.tokens
    }

    // A panic while holding the lock cannot leave the counters inconsistent
    // (every write is a single assignment), so a poisoned lock is reused.
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let interval = self.policy.refill_interval.as_nanos();
        let intervals = elapsed.as_nanos() / interval;

        if intervals > 0 {
            let intervals = u64::try_from(intervals).unwrap_or(u64::MAX);
            let added = intervals.saturating_mul(self.policy.refill_rate);
            state.tokens = state.tokens.saturating_add(added);
            // Only whole intervals are consumed; the partial one keeps counting.
            let partial = Duration::from_nanos((elapsed.as_nanos() % interval) as u64);
            state.last_refill = now - partial;
        }

        state.tokens = state.tokens.min(self.policy.capacity);
    }

    fn time_until_available(&self, state: &BucketState, n: u64, now: Instant) -> Duration {
        let missing = n - state.tokens;
        let intervals = missing.div_ceil(self.policy.refill_rate);
        let intervals = u32::try_from(intervals).unwrap_or(u32::MAX);
        let since_refill = now.saturating_duration_since(state.last_refill);

        self.policy
            .refill_interval
            .checked_mul(intervals)
            .unwrap_or(Duration::MAX)
            .saturating_sub(since_refill)
    }
}
