use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{RateLimitPolicy, TokenBucket};

/// Concurrent directory of buckets keyed by rate-limit key.
///
/// Lookups lock only the shard holding the key, so unrelated keys never
/// contend. Entries idle for longer than `idle_threshold` are dropped by
/// [`BucketRegistry::sweep`].
///
/// A caller that obtained a bucket just before its entry was swept keeps
/// consuming from the detached bucket, and the next lookup creates a fresh,
/// full one. The only effect is a quota reset for that key.
#[derive(Debug)]
pub struct BucketRegistry {
    policy: RateLimitPolicy,
    idle_threshold: Duration,
    epoch: Instant,
    entries: DashMap<String, Entry>,
}

#[derive(Debug)]
struct Entry {
    bucket: Arc<TokenBucket>,
    /// Nanoseconds since the registry epoch.
    last_accessed: AtomicU64,
}

impl BucketRegistry {
    pub fn new(policy: RateLimitPolicy, idle_threshold: Duration) -> Self {
        Self {
            policy,
            idle_threshold,
            epoch: Instant::now(),
            entries: DashMap::new(),
        }
    }

    /// Returns the bucket for `key`, creating it if absent.
    ///
    /// Creation goes through the shard's entry lock, so concurrent first
    /// lookups for one key all receive the same bucket.
    pub fn get_or_create(&self, key: &str) -> Arc<TokenBucket> {
        let now = self.now();

        if let Some(entry) = self.entries.get(key) {
            entry.last_accessed.store(now, Ordering::Relaxed);
            return Arc::clone(&entry.bucket);
        }

        let entry = self.entries.entry(key.to_owned()).or_insert_with(|| {
            tracing::debug!("Creating rate limit bucket for {}", key);
            Entry {
                bucket: Arc::new(TokenBucket::new(self.policy)),
                last_accessed: AtomicU64::new(now),
            }
        });
        entry.last_accessed.store(now, Ordering::Relaxed);
        Arc::clone(&entry.bucket)
    }

    /// Removes every entry not accessed within the idle threshold and
    /// returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.now();
        let threshold = u64::try_from(self.idle_threshold.as_nanos()).unwrap_or(u64::MAX);
        let before = self.entries.len();

        // Shards are locked one at a time.
        self.entries.retain(|_, entry| {
            now.saturating_sub(entry.last_accessed.load(Ordering::Relaxed)) <= threshold
        });

        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(
                "Evicted {} idle rate limit buckets, {} remaining",
                removed,
                self.entries.len()
            );
        }
        removed
    }

    /// Runs [`BucketRegistry::sweep`] every `period` until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                registry.sweep();
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn now(&self) -> u64 {
        let elapsed = Instant::now().saturating_duration_since(self.epoch);
        u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX)
    }
}
