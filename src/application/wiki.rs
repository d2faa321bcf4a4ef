//! Article pipeline: look an article up, generate it on first visit, and
//! render its body with word links.

use std::{num::NonZeroUsize, sync::Arc};

use metrics::counter;
use thiserror::Error;
use tracing::{debug, info};

use crate::application::generator::{
    ArticleGenerator, GenerationError, GenerationPolicy, generate_with_retry,
};
use crate::application::links::{LinkError, LinkExtractor, LinkResolver, LinkSet};
use crate::application::normalizer::WordNormalizer;
use crate::application::repos::{
    ArticlesRepo, ArticlesWriteRepo, CreateArticleParams, CreateOutcome, RepoError,
};
use crate::application::sanitize::sanitize_article_html;
use crate::cache::{CacheKey, ReadThroughCache};
use crate::domain::entities::ArticleRecord;
pub use crate::domain::entities::{ArticleView, LinkView};
use crate::domain::pointer::display_title;

const DEFAULT_NORMALIZER_CAPACITY: NonZeroUsize = NonZeroUsize::MIN.saturating_add(999);
const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(99);

#[derive(Debug, Error)]
pub enum WikiError {
    #[error("title does not name an article")]
    NotFound,
    #[error("article generation failed")]
    GenerationFailed(#[source] GenerationError),
    #[error(transparent)]
    Store(#[from] RepoError),
    #[error(transparent)]
    Links(#[from] LinkError),
}

#[derive(Debug, Clone, Copy)]
pub struct WikiOptions {
    pub normalizer_capacity: NonZeroUsize,
    pub batch_size: NonZeroUsize,
    pub min_word_len: usize,
    pub generation: GenerationPolicy,
}

impl Default for WikiOptions {
    fn default() -> Self {
        Self {
            normalizer_capacity: DEFAULT_NORMALIZER_CAPACITY,
            batch_size: DEFAULT_BATCH_SIZE,
            min_word_len: 3,
            generation: GenerationPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct WikiService {
    normalizer: Arc<WordNormalizer>,
    extractor: Arc<LinkExtractor>,
    resolver: Arc<LinkResolver>,
    articles: Arc<dyn ArticlesRepo>,
    writer: Arc<dyn ArticlesWriteRepo>,
    generator: Arc<dyn ArticleGenerator>,
    cache: ReadThroughCache,
    generation: GenerationPolicy,
}

impl WikiService {
    pub fn new(
        articles: Arc<dyn ArticlesRepo>,
        writer: Arc<dyn ArticlesWriteRepo>,
        generator: Arc<dyn ArticleGenerator>,
        cache: ReadThroughCache,
        options: WikiOptions,
    ) -> Self {
        let normalizer = Arc::new(WordNormalizer::new(options.normalizer_capacity));
        let extractor = LinkExtractor::new(normalizer.clone(), options.min_word_len);
        let resolver = LinkResolver::new(articles.clone(), options.batch_size);

        Self {
            normalizer,
            extractor: Arc::new(extractor),
            resolver: Arc::new(resolver),
            articles,
            writer,
            generator,
            cache,
            generation: options.generation,
        }
    }

    pub fn normalizer(&self) -> &WordNormalizer {
        &self.normalizer
    }

    /// Serve the article named by `raw_title`, generating and storing it on
    /// first request. The discovery is attributed to `user`.
    pub async fn article(&self, raw_title: &str, user: &str) -> Result<ArticleView, WikiError> {
        let pointer = self.normalizer.normalize(raw_title);
        if pointer.is_empty() {
            return Err(WikiError::NotFound);
        }

        let rendered = self
            .cache
            .get_or_compute_present(CacheKey::RenderedArticle(pointer.clone()), || {
                self.render_stored(&pointer)
            })
            .await?;
        if let Some(view) = rendered {
            return Ok(view);
        }

        let (record, created) = self.discover(raw_title, &pointer, user).await?;
        let view = self.present(record, created).await?;
        self.cache
            .prime(
                CacheKey::RenderedArticle(pointer),
                ArticleView {
                    created: false,
                    ..view.clone()
                },
            )
            .await;
        Ok(view)
    }

    /// Render an already stored article. Link liveness is fixed for as long
    /// as the rendered page stays cached.
    async fn render_stored(&self, pointer: &str) -> Result<Option<ArticleView>, WikiError> {
        let stored = self
            .cache
            .get_or_compute_present(CacheKey::Article(pointer.to_string()), || {
                self.articles.find_by_pointer(pointer)
            })
            .await?;

        match stored {
            Some(record) => self.present(record, false).await.map(Some),
            None => Ok(None),
        }
    }

    async fn discover(
        &self,
        raw_title: &str,
        pointer: &str,
        user: &str,
    ) -> Result<(ArticleRecord, bool), WikiError> {
        let name = display_title(raw_title);
        let request = self.generation.request(&name, user);
        let generated = generate_with_retry(self.generator.as_ref(), &request, self.generation.retry)
            .await
            .map_err(WikiError::GenerationFailed)?;

        let body_html = sanitize_article_html(&generated);
        if body_html.trim().is_empty() {
            return Err(WikiError::GenerationFailed(GenerationError::Malformed(
                "article body is empty after sanitizing".to_string(),
            )));
        }

        let outcome = self
            .writer
            .create_article(CreateArticleParams {
                pointer: pointer.to_string(),
                name,
                body_html,
                discovered_by: user.to_string(),
            })
            .await?;

        match outcome {
            CreateOutcome::Created(record) => {
                counter!("infinitewiki_articles_generated_total").increment(1);
                info!(
                    target = "infinitewiki::wiki",
                    pointer,
                    discovered_by = user,
                    "article discovered"
                );

                self.cache.invalidate(&CacheKey::SiteStats).await;
                self.cache
                    .invalidate(&CacheKey::UserStats(user.to_string()))
                    .await;
                self.cache
                    .prime(CacheKey::Article(pointer.to_string()), record.clone())
                    .await;

                Ok((record, true))
            }
            CreateOutcome::Duplicate => {
                debug!(
                    target = "infinitewiki::wiki",
                    pointer, "lost creation race; serving stored article"
                );
                let winner = self.articles.find_by_pointer(pointer).await?.ok_or_else(|| {
                    RepoError::Integrity {
                        message: format!("article `{pointer}` reported duplicate but is missing"),
                    }
                })?;
                self.cache
                    .prime(CacheKey::Article(pointer.to_string()), winner.clone())
                    .await;

                Ok((winner, false))
            }
        }
    }

    async fn present(&self, record: ArticleRecord, created: bool) -> Result<ArticleView, WikiError> {
        let candidates = self
            .extractor
            .candidates(&record.body_html, &record.pointer)?;
        let links: LinkSet = self.resolver.resolve(&candidates).await?;
        let body_html = self.extractor.render(&record.body_html, &links)?;

        let links_view = candidates
            .into_iter()
            .map(|candidate| LinkView {
                live: links.is_live(&candidate.pointer),
                word: candidate.word,
                pointer: candidate.pointer,
            })
            .collect();

        Ok(ArticleView {
            title: record.name,
            pointer: record.pointer,
            body_html,
            discovered_by: record.discovered_by,
            discovery_time: record.discovery_time,
            links: links_view,
            live_links: links.live_count(),
            created,
        })
    }
}
