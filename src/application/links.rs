//! Word-link pipeline: pick link candidates out of an article body, resolve
//! which already have articles in batched lookups, and wrap them in anchors.

use std::{collections::HashSet, num::NonZeroUsize, sync::Arc};

use futures::future::try_join_all;
use lol_html::{RewriteStrSettings, doc_text, html_content::ContentType, rewrite_str};
use once_cell::sync::Lazy;
use serde::Serialize;
use thiserror::Error;

use crate::application::normalizer::WordNormalizer;
use crate::application::repos::{ArticlesRepo, RepoError};
use crate::domain::pointer::entity_len;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("failed to rewrite article markup: {0}")]
    Rewrite(String),
}

/// A word worth linking, keyed by its pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkCandidate {
    /// First surface form seen in the text.
    pub word: String,
    pub pointer: String,
}

/// Outcome of resolving a candidate list against the article store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    candidates: HashSet<String>,
    live: HashSet<String>,
}

impl LinkSet {
    pub fn new(candidates: HashSet<String>, live: HashSet<String>) -> Self {
        Self { candidates, live }
    }

    pub fn is_candidate(&self, pointer: &str) -> bool {
        self.candidates.contains(pointer)
    }

    /// True when the pointer already has an article.
    pub fn is_live(&self, pointer: &str) -> bool {
        self.live.contains(pointer)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

pub struct LinkExtractor {
    normalizer: Arc<WordNormalizer>,
    min_word_len: usize,
}

impl LinkExtractor {
    pub fn new(normalizer: Arc<WordNormalizer>, min_word_len: usize) -> Self {
        Self {
            normalizer,
            min_word_len,
        }
    }

    /// Distinct link candidates in first-seen order. `exclude` is the pointer
    /// of the article being rendered; it never links to itself.
    pub fn candidates(&self, html: &str, exclude: &str) -> Result<Vec<LinkCandidate>, LinkError> {
        let text = collect_text(html)?;
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for token in text.split_whitespace() {
            let Some(pointer) = self.eligible_pointer(token) else {
                continue;
            };
            if pointer == exclude || !seen.insert(pointer.clone()) {
                continue;
            }
            let word = core_bounds(token)
                .map(|(start, end)| token[start..end].to_string())
                .unwrap_or_else(|| token.to_string());
            candidates.push(LinkCandidate { word, pointer });
        }

        Ok(candidates)
    }

    /// Rewrite `html`, wrapping every token whose pointer is in `links`.
    pub fn render(&self, html: &str, links: &LinkSet) -> Result<String, LinkError> {
        render_links(html, links, &|token: &str| self.eligible_pointer(token))
    }

    fn eligible_pointer(&self, token: &str) -> Option<String> {
        let pointer = self.normalizer.normalize(token);
        if pointer.is_empty()
            || pointer.bytes().all(|b| b.is_ascii_digit())
            || STOP_WORDS.contains(pointer.as_str())
        {
            return None;
        }

        let capitalized = core_bounds(token)
            .and_then(|(start, _)| token[start..].chars().next())
            .is_some_and(|first| first.is_ascii_uppercase());
        let long_enough = pointer.len() >= self.min_word_len;

        (long_enough || (capitalized && pointer.len() >= 2)).then_some(pointer)
    }
}

/// Resolves candidates against the store in bounded batches.
pub struct LinkResolver {
    articles: Arc<dyn ArticlesRepo>,
    batch_size: NonZeroUsize,
}

impl LinkResolver {
    pub fn new(articles: Arc<dyn ArticlesRepo>, batch_size: NonZeroUsize) -> Self {
        Self {
            articles,
            batch_size,
        }
    }

    /// One `existing_pointers` round-trip per batch; batches run concurrently.
    /// A pointer created while this runs may land on either side.
    pub async fn resolve(&self, candidates: &[LinkCandidate]) -> Result<LinkSet, RepoError> {
        let pointers: Vec<String> = candidates.iter().map(|c| c.pointer.clone()).collect();

        let lookups = pointers
            .chunks(self.batch_size.get())
            .map(|batch| self.articles.existing_pointers(batch));
        let live = try_join_all(lookups)
            .await?
            .into_iter()
            .flatten()
            .collect();

        Ok(LinkSet::new(pointers.into_iter().collect(), live))
    }
}

/// Wrap the alphanumeric core of every candidate token in `html` with an
/// anchor to its article. Live pointers get `wiki-link`; the rest also get
/// `wiki-link--new`. Markup and surrounding punctuation are left untouched.
///
/// `eligible` maps a token to its pointer only when the token itself may be
/// linked, so "al" stays plain text even when "Al" made `al` a candidate.
pub fn render_links(
    html: &str,
    links: &LinkSet,
    eligible: &dyn Fn(&str) -> Option<String>,
) -> Result<String, LinkError> {
    if links.is_empty() {
        return Ok(html.to_string());
    }

    let mut pending = String::new();
    rewrite_str(
        html,
        RewriteStrSettings {
            document_content_handlers: vec![doc_text!(|chunk| {
                pending.push_str(chunk.as_str());
                if chunk.last_in_text_node() {
                    let linked = link_text(&pending, links, eligible);
                    chunk.replace(&linked, ContentType::Html);
                    pending.clear();
                } else {
                    chunk.remove();
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| LinkError::Rewrite(err.to_string()))
}

fn link_text(text: &str, links: &LinkSet, eligible: &dyn Fn(&str) -> Option<String>) -> String {
    let mut linked = String::with_capacity(text.len() * 2);
    let mut rest = text;

    while !rest.is_empty() {
        let gap = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        linked.push_str(&rest[..gap]);
        rest = &rest[gap..];
        if rest.is_empty() {
            break;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        push_token(&mut linked, &rest[..end], links, eligible);
        rest = &rest[end..];
    }

    linked
}

fn push_token(
    out: &mut String,
    token: &str,
    links: &LinkSet,
    eligible: &dyn Fn(&str) -> Option<String>,
) {
    let linkable = eligible(token)
        .filter(|pointer| links.is_candidate(pointer))
        .zip(core_bounds(token));
    let Some((pointer, (start, end))) = linkable else {
        out.push_str(token);
        return;
    };

    let class = if links.is_live(&pointer) {
        "wiki-link"
    } else {
        "wiki-link wiki-link--new"
    };
    out.push_str(&token[..start]);
    out.push_str("<a class=\"");
    out.push_str(class);
    out.push_str("\" href=\"/article/");
    out.push_str(&pointer);
    out.push_str("\">");
    out.push_str(&token[start..end]);
    out.push_str("</a>");
    out.push_str(&token[end..]);
}

/// Concatenated text of every text node, with a space between nodes.
fn collect_text(html: &str) -> Result<String, LinkError> {
    let mut text = String::with_capacity(html.len());
    rewrite_str(
        html,
        RewriteStrSettings {
            document_content_handlers: vec![doc_text!(|chunk| {
                text.push_str(chunk.as_str());
                if chunk.last_in_text_node() {
                    text.push(' ');
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(|err| LinkError::Rewrite(err.to_string()))?;
    Ok(text)
}

/// Byte range of a token between its leading and trailing punctuation.
/// Character references at either edge count as punctuation.
fn core_bounds(token: &str) -> Option<(usize, usize)> {
    let mut start = 0;
    loop {
        let rest = &token[start..];
        let ch = rest.chars().next()?;
        if ch.is_ascii_alphanumeric() {
            break;
        }
        start += match (ch, entity_len(rest)) {
            ('&', Some(len)) => len,
            _ => ch.len_utf8(),
        };
    }

    let mut end = token.len();
    loop {
        let head = &token[start..end];
        let ch = head.chars().next_back()?;
        if ch.is_ascii_alphanumeric() {
            break;
        }
        let trailing_entity = (ch == ';')
            .then(|| head.rfind('&'))
            .flatten()
            .filter(|&amp| entity_len(&head[amp..]) == Some(head.len() - amp));
        end = match trailing_entity {
            Some(amp) => start + amp,
            None => end - ch.len_utf8(),
        };
    }

    Some((start, end))
}

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "a", "about", "above", "after", "again", "against", "all", "also", "am", "an", "and",
        "any", "are", "as", "at", "be", "because", "been", "before", "being", "below",
        "between", "both", "but", "by", "can", "could", "did", "do", "does", "doing", "down",
        "during", "each", "either", "even", "ever", "few", "for", "from", "further", "had",
        "has", "have", "having", "he", "her", "here", "hers", "herself", "him", "himself",
        "his", "how", "however", "i", "if", "in", "into", "is", "it", "its", "itself", "just",
        "like", "many", "may", "me", "might", "more", "most", "much", "must", "my", "myself",
        "no", "nor", "not", "now", "of", "off", "often", "on", "once", "only", "or", "other",
        "our", "ours", "ourselves", "out", "over", "own", "same", "several", "she", "should",
        "since", "so", "some", "such", "than", "that", "the", "their", "theirs", "them",
        "themselves", "then", "there", "these", "they", "this", "those", "through", "thus",
        "to", "too", "under", "until", "up", "upon", "us", "very", "was", "we", "were",
        "what", "when", "where", "whether", "which", "while", "who", "whom", "whose", "why",
        "will", "with", "within", "without", "would", "yet", "you", "your", "yours",
        "yourself", "yourselves",
    ])
});
