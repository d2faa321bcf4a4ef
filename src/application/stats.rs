use std::sync::Arc;

use crate::application::repos::{DiscoveriesRepo, RepoError};
use crate::cache::{CacheKey, ReadThroughCache};
use crate::domain::entities::{DiscovererRecord, SiteStats};

/// Discovery statistics, read through the cache. Both keys are invalidated
/// by [`crate::application::wiki::WikiService`] when an article is created.
#[derive(Clone)]
pub struct StatsService {
    discoveries: Arc<dyn DiscoveriesRepo>,
    cache: ReadThroughCache,
}

impl StatsService {
    pub fn new(discoveries: Arc<dyn DiscoveriesRepo>, cache: ReadThroughCache) -> Self {
        Self { discoveries, cache }
    }

    pub async fn site_stats(&self) -> Result<SiteStats, RepoError> {
        self.cache
            .get_or_compute(CacheKey::SiteStats, || self.discoveries.site_stats())
            .await
    }

    pub async fn user_stats(&self, user_id: &str) -> Result<Option<DiscovererRecord>, RepoError> {
        self.cache
            .get_or_compute_present(CacheKey::UserStats(user_id.to_string()), || {
                self.discoveries.find_discoverer(user_id)
            })
            .await
    }
}
