//! Cache keys.

use std::fmt;

/// Logical resource a cached value stands in for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Article row by pointer.
    Article(String),
    /// Article page by pointer, body already linked.
    RenderedArticle(String),
    /// Aggregate counters shown on every page.
    SiteStats,
    /// Discovery tally of one user.
    UserStats(String),
}

impl CacheKey {
    /// Low-cardinality label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheKey::Article(_) => "article",
            CacheKey::RenderedArticle(_) => "rendered_article",
            CacheKey::SiteStats => "site_stats",
            CacheKey::UserStats(_) => "user_stats",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Article(pointer) => write!(f, "article:{pointer}"),
            CacheKey::RenderedArticle(pointer) => write!(f, "rendered_article:{pointer}"),
            CacheKey::SiteStats => f.write_str("site_stats"),
            CacheKey::UserStats(user) => write!(f, "user_stats:{user}"),
        }
    }
}
