//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A generated article. Rows are written once and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleRecord {
    pub id: Uuid,
    pub pointer: String,
    pub name: String,
    pub body_html: String,
    pub discovered_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub discovery_time: OffsetDateTime,
}

/// Per-user discovery tally, bumped on every article the user causes to exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscovererRecord {
    pub user_id: String,
    pub discoveries: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_active_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MostActiveDiscoverer {
    pub user_id: String,
    pub discoveries: i64,
}

/// Aggregate counters shown in the page chrome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SiteStats {
    pub total_articles: i64,
    pub total_discoverers: i64,
    pub most_active: Option<MostActiveDiscoverer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkView {
    pub word: String,
    pub pointer: String,
    pub live: bool,
}

/// An article ready to present, with its body already linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticleView {
    pub title: String,
    pub pointer: String,
    pub body_html: String,
    pub discovered_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub discovery_time: OffsetDateTime,
    pub links: Vec<LinkView>,
    pub live_links: usize,
    /// True when this request caused the article to exist.
    pub created: bool,
}
