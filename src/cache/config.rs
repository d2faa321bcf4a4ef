//! Cache configuration.

use std::{num::NonZeroUsize, time::Duration};

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_PURGE_INTERVAL_SECS: u64 = 60;
const DEFAULT_NORMALIZER_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(999);

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every lookup goes straight to the store.
    pub enabled: bool,
    /// Lifetime of a cached value.
    pub ttl: Duration,
    /// Cadence of the sweep that drops expired entries.
    pub purge_interval: Duration,
    /// Capacity of the word-normalisation memo.
    pub normalizer_capacity: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            purge_interval: Duration::from_secs(DEFAULT_PURGE_INTERVAL_SECS),
            normalizer_capacity: DEFAULT_NORMALIZER_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            ttl: settings.ttl,
            purge_interval: settings.purge_interval,
            normalizer_capacity: settings.normalizer_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.purge_interval, Duration::from_secs(60));
        assert_eq!(config.normalizer_capacity.get(), 1_000);
    }

    #[test]
    fn settings_carry_over_unchanged() {
        let settings = crate::config::CacheSettings {
            enabled: false,
            ttl: Duration::from_secs(600),
            purge_interval: Duration::from_secs(30),
            normalizer_capacity: NonZeroUsize::MIN.saturating_add(41),
        };
        let config = CacheConfig::from(&settings);

        assert!(!config.enabled);
        assert_eq!(config.ttl, Duration::from_secs(600));
        assert_eq!(config.purge_interval, Duration::from_secs(30));
        assert_eq!(config.normalizer_capacity.get(), 42);
    }
}
