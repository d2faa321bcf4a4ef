//! Cache backends.
//!
//! [`MemoryCache`] is the in-process backend: a sharded map whose entries
//! carry their own deadline. [`DisabledCache`] never stores anything and is
//! used when caching is switched off.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::domain::entities::{ArticleRecord, ArticleView, DiscovererRecord, SiteStats};

use super::keys::CacheKey;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("ttl of {0:?} is out of range")]
    TtlOutOfRange(Duration),
}

/// Values the cache knows how to hold.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Article(ArticleRecord),
    RenderedArticle(ArticleView),
    Discoverer(DiscovererRecord),
    SiteStats(SiteStats),
}

/// Conversion between a typed value and its cached representation.
pub trait Cacheable: Sized {
    fn into_cached(self) -> CachedValue;

    fn from_cached(value: CachedValue) -> Option<Self>;
}

impl Cacheable for ArticleRecord {
    fn into_cached(self) -> CachedValue {
        CachedValue::Article(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Article(article) => Some(article),
            _ => None,
        }
    }
}

impl Cacheable for ArticleView {
    fn into_cached(self) -> CachedValue {
        CachedValue::RenderedArticle(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::RenderedArticle(view) => Some(view),
            _ => None,
        }
    }
}

impl Cacheable for DiscovererRecord {
    fn into_cached(self) -> CachedValue {
        CachedValue::Discoverer(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::Discoverer(record) => Some(record),
            _ => None,
        }
    }
}

impl Cacheable for SiteStats {
    fn into_cached(self) -> CachedValue {
        CachedValue::SiteStats(self)
    }

    fn from_cached(value: CachedValue) -> Option<Self> {
        match value {
            CachedValue::SiteStats(stats) => Some(stats),
            _ => None,
        }
    }
}

/// Storage behind [`super::ReadThroughCache`].
///
/// Implementations must tolerate concurrent callers. Errors are reported,
/// not retried; the read-through wrapper falls back to the store.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedValue>, CacheError>;

    async fn put(&self, key: CacheKey, value: CachedValue, ttl: Duration)
    -> Result<(), CacheError>;

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CachedValue,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-process TTL cache. Unbounded; entries leave on expiry or invalidation.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
        let now = Instant::now();
        // The shard guard must be released before `remove_if` touches the same shard.
        let live = {
            let entry = self.entries.get(key)?;
            entry.is_live(now).then(|| entry.value.clone())
        };
        if live.is_none() {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        live
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<CachedValue>, CacheError> {
        Ok(self.lookup(key))
    }

    async fn put(
        &self,
        key: CacheKey,
        value: CachedValue,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or(CacheError::TtlOutOfRange(ttl))?;
        self.entries.insert(key, CacheEntry { value, expires_at });
        Ok(())
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Backend that never holds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledCache;

#[async_trait]
impl CacheBackend for DisabledCache {
    async fn get(&self, _key: &CacheKey) -> Result<Option<CachedValue>, CacheError> {
        Ok(None)
    }

    async fn put(
        &self,
        _key: CacheKey,
        _value: CachedValue,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn invalidate(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Ok(())
    }
}
