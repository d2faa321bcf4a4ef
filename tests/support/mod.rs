//! In-memory fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Barrier, Mutex};

use infinitewiki::application::generator::{ArticleGenerator, GenerationError, GenerationRequest};
use infinitewiki::application::repos::{
    ArticlesRepo, ArticlesWriteRepo, CreateArticleParams, CreateOutcome, DiscoveriesRepo,
    RepoError,
};
use infinitewiki::application::stats::StatsService;
use infinitewiki::application::wiki::{WikiOptions, WikiService};
use infinitewiki::cache::ReadThroughCache;
use infinitewiki::domain::entities::{
    ArticleRecord, DiscovererRecord, MostActiveDiscoverer, SiteStats,
};
use infinitewiki::domain::pointer::article_id;
use infinitewiki::infra::http::HealthProbe;

#[derive(Default)]
pub struct MemoryStore {
    articles: Mutex<HashMap<String, ArticleRecord>>,
    discoverers: Mutex<HashMap<String, DiscovererRecord>>,
    pub find_calls: AtomicUsize,
    pub batch_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub unavailable: AtomicBool,
    /// Makes crediting a discoverer fail, which must abort article creation.
    pub discoveries_unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert(&self, pointer: &str, name: &str, body_html: &str, discovered_by: &str) {
        let record = ArticleRecord {
            id: article_id(pointer),
            pointer: pointer.to_string(),
            name: name.to_string(),
            body_html: body_html.to_string(),
            discovered_by: discovered_by.to_string(),
            discovery_time: OffsetDateTime::now_utc(),
        };
        self.articles.lock().await.insert(pointer.to_string(), record);
    }

    pub async fn article(&self, pointer: &str) -> Option<ArticleRecord> {
        self.articles.lock().await.get(pointer).cloned()
    }

    pub async fn article_count(&self) -> usize {
        self.articles.lock().await.len()
    }

    pub async fn discoveries_of(&self, user_id: &str) -> i64 {
        self.discoverers
            .lock()
            .await
            .get(user_id)
            .map(|record| record.discoveries)
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(RepoError::Timeout)
        } else {
            Ok(())
        }
    }

    fn credit(
        &self,
        discoverers: &mut HashMap<String, DiscovererRecord>,
        user_id: &str,
    ) -> Result<(), RepoError> {
        if self.discoveries_unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::Persistence("discoverers table is locked".into()));
        }
        let now = OffsetDateTime::now_utc();
        let entry = discoverers
            .entry(user_id.to_string())
            .or_insert_with(|| DiscovererRecord {
                user_id: user_id.to_string(),
                discoveries: 0,
                last_active_at: now,
            });
        entry.discoveries += 1;
        entry.last_active_at = now;
        Ok(())
    }
}

#[async_trait]
impl ArticlesRepo for MemoryStore {
    async fn find_by_pointer(&self, pointer: &str) -> Result<Option<ArticleRecord>, RepoError> {
        self.check_available()?;
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.articles.lock().await.get(pointer).cloned())
    }

    async fn existing_pointers(&self, pointers: &[String]) -> Result<HashSet<String>, RepoError> {
        self.check_available()?;
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let articles = self.articles.lock().await;
        Ok(pointers
            .iter()
            .filter(|pointer| articles.contains_key(pointer.as_str()))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ArticlesWriteRepo for MemoryStore {
    async fn create_article(
        &self,
        params: CreateArticleParams,
    ) -> Result<CreateOutcome, RepoError> {
        self.check_available()?;
        let mut articles = self.articles.lock().await;
        if articles.contains_key(&params.pointer) {
            return Ok(CreateOutcome::Duplicate);
        }
        let record = ArticleRecord {
            id: article_id(&params.pointer),
            pointer: params.pointer.clone(),
            name: params.name,
            body_html: params.body_html,
            discovered_by: params.discovered_by,
            discovery_time: OffsetDateTime::now_utc(),
        };
        // Credit first so a failure leaves neither the article nor the tally.
        self.credit(&mut *self.discoverers.lock().await, &record.discovered_by)?;
        articles.insert(params.pointer, record.clone());
        Ok(CreateOutcome::Created(record))
    }
}

#[async_trait]
impl DiscoveriesRepo for MemoryStore {
    async fn record_discovery(&self, user_id: &str, _pointer: &str) -> Result<(), RepoError> {
        self.check_available()?;
        self.credit(&mut *self.discoverers.lock().await, user_id)
    }

    async fn find_discoverer(&self, user_id: &str) -> Result<Option<DiscovererRecord>, RepoError> {
        self.check_available()?;
        Ok(self.discoverers.lock().await.get(user_id).cloned())
    }

    async fn site_stats(&self) -> Result<SiteStats, RepoError> {
        self.check_available()?;
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        let total_articles = self.articles.lock().await.len() as i64;
        let discoverers = self.discoverers.lock().await;
        let most_active = discoverers
            .values()
            .max_by(|a, b| {
                a.discoveries
                    .cmp(&b.discoveries)
                    .then_with(|| b.user_id.cmp(&a.user_id))
            })
            .map(|record| MostActiveDiscoverer {
                user_id: record.user_id.clone(),
                discoveries: record.discoveries,
            });
        Ok(SiteStats {
            total_articles,
            total_discoverers: discoverers.len() as i64,
            most_active,
        })
    }
}

#[async_trait]
impl HealthProbe for MemoryStore {
    async fn ping(&self) -> Result<(), sqlx::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(sqlx::Error::PoolTimedOut)
        } else {
            Ok(())
        }
    }
}

/// Generator answering every title with a fixed body, or failing.
pub struct ScriptedGenerator {
    body: Option<String>,
    failure: Option<GenerationError>,
    barrier: Option<Barrier>,
    pub calls: AtomicUsize,
    pub titles: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn answering(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body.to_string()),
            failure: None,
            barrier: None,
            calls: AtomicUsize::new(0),
            titles: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(failure: GenerationError) -> Arc<Self> {
        Arc::new(Self {
            body: None,
            failure: Some(failure),
            barrier: None,
            calls: AtomicUsize::new(0),
            titles: Mutex::new(Vec::new()),
        })
    }

    /// Holds each call until `parties` callers are generating at once.
    pub fn answering_together(body: &str, parties: usize) -> Arc<Self> {
        Arc::new(Self {
            body: Some(body.to_string()),
            failure: None,
            barrier: Some(Barrier::new(parties)),
            calls: AtomicUsize::new(0),
            titles: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArticleGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.titles.lock().await.push(request.title.clone());
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        match (&self.body, &self.failure) {
            (_, Some(failure)) => Err(failure.clone()),
            (Some(body), None) => Ok(body.clone()),
            (None, None) => Err(GenerationError::Malformed("no scripted reply".into())),
        }
    }
}

pub fn wiki_service(
    store: &Arc<MemoryStore>,
    generator: Arc<dyn ArticleGenerator>,
    cache: ReadThroughCache,
) -> WikiService {
    let mut options = WikiOptions::default();
    options.generation.retry.backoff = std::time::Duration::from_millis(1);
    WikiService::new(
        store.clone(),
        store.clone(),
        generator,
        cache,
        options,
    )
}

pub fn stats_service(store: &Arc<MemoryStore>, cache: ReadThroughCache) -> StatsService {
    StatsService::new(store.clone(), cache)
}

pub const PHOTOSYNTHESIS_HTML: &str = "<p>Photosynthesis turns light into sugar. \
Chlorophyll absorbs light inside every leaf.</p>\
<h2>Overview</h2><p>Plants, algae and cyanobacteria rely on <a href=\"https://example.com\">chlorophyll</a>.</p>\
<script>alert(1)</script>";
