//! InfiniteWiki cache layer
//!
//! A short-TTL key/value layer in front of the article store and the
//! discovery statistics. The store stays authoritative: every value here
//! expires after the configured TTL and is dropped explicitly when a write
//! changes what it summarises.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 300
//! purge_interval_seconds = 60
//! normalizer_capacity = 1000
//! ```

mod config;
mod keys;
pub(crate) mod lock;
mod read_through;
mod store;

pub use config::CacheConfig;
pub use keys::CacheKey;
pub use read_through::ReadThroughCache;
pub use store::{
    CacheBackend, CacheError, Cacheable, CachedValue, DisabledCache, MemoryCache,
};
