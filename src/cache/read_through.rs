use std::{future::Future, sync::Arc, time::Duration};

use metrics::counter;
use tracing::{debug, warn};

use super::keys::CacheKey;
use super::store::{CacheBackend, CacheError, Cacheable, DisabledCache, MemoryCache};
use super::config::CacheConfig;

/// Read-through wrapper composing a [`CacheBackend`] with a caller-supplied
/// loader from the authoritative store.
///
/// Backend failures never fail the caller: the loader runs instead and the
/// failure is logged and counted.
#[derive(Clone)]
pub struct ReadThroughCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
}

impl ReadThroughCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// A cache that always misses.
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledCache), Duration::ZERO)
    }

    /// Build the configured cache. The in-memory backend is returned as well so
    /// the caller can schedule its expiry sweep.
    pub fn from_config(config: &CacheConfig) -> (Self, Option<Arc<MemoryCache>>) {
        if !config.enabled {
            return (Self::disabled(), None);
        }
        let memory = Arc::new(MemoryCache::new());
        let backend: Arc<dyn CacheBackend> = memory.clone();
        (Self::new(backend, config.ttl), Some(memory))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value for `key`, or run `load`, cache its result for
    /// the configured TTL, and return it. Loader errors are passed through
    /// and nothing is cached.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: CacheKey, load: F) -> Result<T, E>
    where
        T: Cacheable + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.lookup::<T>(&key).await {
            return Ok(hit);
        }

        let value = load().await?;
        self.store(key, value.clone()).await;
        Ok(value)
    }

    /// Like [`Self::get_or_compute`] for loaders that may find nothing.
    /// Absent results are not cached, so a row created a moment later is seen
    /// by the next lookup.
    pub async fn get_or_compute_present<T, E, F, Fut>(
        &self,
        key: CacheKey,
        load: F,
    ) -> Result<Option<T>, E>
    where
        T: Cacheable + Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(hit) = self.lookup::<T>(&key).await {
            return Ok(Some(hit));
        }

        let value = load().await?;
        if let Some(found) = value.as_ref() {
            self.store(key, found.clone()).await;
        }
        Ok(value)
    }

    /// Seed `key` with a value the caller just wrote.
    pub async fn prime<T: Cacheable>(&self, key: CacheKey, value: T) {
        self.store(key, value).await;
    }

    /// Drop `key` so the next lookup reloads from the store.
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Err(err) = self.backend.invalidate(key).await {
            // A failed invalidation can leave a stale value for at most one TTL.
            degraded(key, "invalidate", &err);
        }
    }

    async fn lookup<T: Cacheable>(&self, key: &CacheKey) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(value)) => match T::from_cached(value) {
                Some(hit) => {
                    counter!("infinitewiki_cache_hit_total", "kind" => key.kind()).increment(1);
                    Some(hit)
                }
                None => {
                    warn!(
                        target = "infinitewiki::cache",
                        key = %key,
                        "cached value has unexpected type; reloading"
                    );
                    counter!("infinitewiki_cache_miss_total", "kind" => key.kind()).increment(1);
                    None
                }
            },
            Ok(None) => {
                counter!("infinitewiki_cache_miss_total", "kind" => key.kind()).increment(1);
                None
            }
            Err(err) => {
                degraded(key, "get", &err);
                None
            }
        }
    }

    async fn store<T: Cacheable>(&self, key: CacheKey, value: T) {
        let label = key.kind();
        let result = self.backend.put(key, value.into_cached(), self.ttl).await;
        match result {
            Ok(()) => debug!(target = "infinitewiki::cache", kind = label, "cached value"),
            Err(err) => {
                warn!(
                    target = "infinitewiki::cache",
                    kind = label,
                    op = "put",
                    error = %err,
                    "cache backend failed; serving from store"
                );
                counter!("infinitewiki_cache_degraded_total", "kind" => label).increment(1);
            }
        }
    }
}

fn degraded(key: &CacheKey, op: &'static str, err: &CacheError) {
    warn!(
        target = "infinitewiki::cache",
        key = %key,
        op,
        error = %err,
        "cache backend failed; serving from store"
    );
    counter!("infinitewiki_cache_degraded_total", "kind" => key.kind()).increment(1);
}
