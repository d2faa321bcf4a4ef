mod support;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_util::debugging::DebuggingRecorder;

use infinitewiki::application::generator::GenerationError;
use infinitewiki::cache::{
    CacheBackend, CacheConfig, CacheError, CacheKey, CachedValue, ReadThroughCache,
};
use infinitewiki::infra::telemetry;

use support::{MemoryStore, ScriptedGenerator, stats_service, wiki_service};

struct BrokenBackend;

#[async_trait]
impl CacheBackend for BrokenBackend {
    async fn get(&self, _key: &CacheKey) -> Result<Option<CachedValue>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn put(
        &self,
        _key: CacheKey,
        _value: CachedValue,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn invalidate(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn pipeline_emits_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let store = MemoryStore::new();
    store.insert("dog", "Dog", "<p>Good dog.</p>", "grace").await;

    // Hit, miss, generation and normalizer memo.
    let cache = ReadThroughCache::from_config(&CacheConfig::default()).0;
    let generator = ScriptedGenerator::answering("<p>Owls hunt at night.</p>");
    let wiki = wiki_service(&store, generator, cache.clone());
    wiki.article("dog", "ada").await.expect("miss then store");
    wiki.article("dog", "ada").await.expect("hit");
    wiki.article("Owl", "ada").await.expect("generated");

    // Retries and final failure.
    let failing = ScriptedGenerator::failing(GenerationError::Transport("reset".into()));
    let wiki = wiki_service(&store, failing, cache);
    wiki.article("Lynx", "ada").await.expect_err("generation fails");

    // A broken backend degrades to the store.
    let broken = ReadThroughCache::new(Arc::new(BrokenBackend), Duration::from_secs(60));
    let stats = stats_service(&store, broken);
    let totals = stats.site_stats().await.expect("served from store");
    assert_eq!(totals.total_articles, 2);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "infinitewiki_cache_hit_total",
        "infinitewiki_cache_miss_total",
        "infinitewiki_cache_degraded_total",
        "infinitewiki_articles_generated_total",
        "infinitewiki_generation_retry_total",
        "infinitewiki_generation_failed_total",
        "infinitewiki_generation_ms",
        "infinitewiki_normalizer_hit_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
