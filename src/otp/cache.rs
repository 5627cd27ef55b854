//! Key-value cache with per-key TTL and atomic increment.
//!
//! The OTP store and the rate limiter only talk to [`KeyValueCache`]; any backend
//! with these primitives (an in-process map, a networked cache) can sit behind it.
//! [`MemoryCache`] is the in-process implementation: a `DashMap` whose entries carry
//! a deadline, checked lazily on every read and swept by a janitor task.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, Instrument};

use super::error::CacheError;

#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Live value for `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Unconditionally store `value` with a fresh TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Overwrite a live value, keeping its remaining TTL. Returns `false` if there
    /// was no live value (nothing is written in that case).
    async fn replace_keep_ttl(&self, key: &str, value: String) -> Result<bool, CacheError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Atomically increment the integer at `key` (absent counts as 0) and re-arm
    /// its expiry to `ttl` from now. Returns the new value.
    async fn incr_expire(&self, key: &str, ttl: Duration) -> Result<i64, CacheError>;

    /// Backend reachability check used by the health endpoint.
    async fn ping(&self) -> Result<(), CacheError>;
}

/// Run one cache operation under a deadline. A timeout is reported, never retried.
///
/// # Errors
/// Returns `CacheError::Timeout` when `fut` does not finish within `timeout`,
/// or the operation's own error.
pub async fn with_deadline<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, CacheError>
where
    F: Future<Output = Result<T, CacheError>>,
{
    let span = tracing::debug_span!("cache.op", cache.operation = operation);
    match tokio::time::timeout(timeout, fut.instrument(span)).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::Timeout { operation, timeout }),
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process cache shared by all request handlers of one instance.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included until the next sweep.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sweep expired entries every `every`. The task ends once the cache is dropped.
    #[must_use]
    pub fn spawn_janitor(cache: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(cache);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let evicted = cache.purge_expired();
                if evicted > 0 {
                    debug!(evicted, "cache janitor evicted expired entries");
                }
            }
        })
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn replace_keep_ttl(&self, key: &str, value: String) -> Result<bool, CacheError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.value = value;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn incr_expire(&self, key: &str, ttl: Duration) -> Result<i64, CacheError> {
        let now = Instant::now();
        let expires_at = now + ttl;

        // The entry guard holds the shard lock, so read-modify-write is atomic per key.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = if occupied.get().is_live(now) {
                    occupied.get().value.parse::<i64>().map_err(|_| {
                        CacheError::Backend(format!("value at {key} is not an integer"))
                    })?
                } else {
                    0
                };
                let next = current.saturating_add(1);
                occupied.insert(CacheEntry {
                    value: next.to_string(),
                    expires_at,
                });
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    value: "1".to_string(),
                    expires_at,
                });
                Ok(1)
            }
        }
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}



#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_set_get_delete() -> Result<(), CacheError> {
        contract::set_get_delete(&MemoryCache::new()).await
    }

    #[tokio::test]
    async fn memory_cache_values_expire() -> Result<(), CacheError> {
        contract::values_expire(&MemoryCache::new()).await
    }

    #[tokio::test]
    async fn memory_cache_replace_keeps_ttl() -> Result<(), CacheError> {
        contract::replace_keeps_ttl(&MemoryCache::new()).await
    }

    #[tokio::test]
    async fn memory_cache_incr_rearms_window() -> Result<(), CacheError> {
        contract::incr_rearms_window(&MemoryCache::new()).await
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn memory_cache_incr_is_atomic() -> Result<(), CacheError> {
        contract::incr_is_atomic(Arc::new(MemoryCache::new())).await
    }

    #[tokio::test]
    async fn incr_rejects_non_integer_values() -> Result<(), CacheError> {
        let cache = MemoryCache::new();
        cache
            .set("k", "not-a-number".to_string(), Duration::from_secs(60))
            .await?;
        let result = cache.incr_expire("k", Duration::from_secs(60)).await;
        assert!(matches!(result, Err(CacheError::Backend(_))));
        Ok(())
    }

    #[tokio::test]
    async fn purge_removes_only_expired() -> Result<(), CacheError> {
        let cache = MemoryCache::new();
        cache
            .set("short", "a".to_string(), Duration::from_millis(20))
            .await?;
        cache
            .set("long", "b".to_string(), Duration::from_secs(60))
            .await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("long").await?.as_deref(), Some("b"));
        Ok(())
    }

    #[tokio::test]
    async fn janitor_sweeps_in_background() -> Result<(), CacheError> {
        let cache = Arc::new(MemoryCache::new());
        let janitor = MemoryCache::spawn_janitor(&cache, Duration::from_millis(20));
        cache
            .set("gone", "x".to_string(), Duration::from_millis(10))
            .await?;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.is_empty());

        drop(cache);
        // With the cache gone the janitor exits on its next tick.
        let finished = tokio::time::timeout(Duration::from_secs(1), janitor).await;
        assert!(finished.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn deadline_reports_timeout() {
        let result = with_deadline(
            "get",
            Duration::from_millis(20),
            testing::StalledCache.get("k"),
        )
        .await;
        assert!(matches!(
            result,
            Err(CacheError::Timeout {
                operation: "get",
                ..
            })
        ));
    }
}
