//! Repository traits describing persistence adapters.

use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{ArticleRecord, DiscovererRecord, SiteStats};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateArticleParams {
    pub pointer: String,
    pub name: String,
    pub body_html: String,
    pub discovered_by: String,
}

/// Result of an insert racing other writers on the same pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(ArticleRecord),
    /// Another writer stored the pointer first; nothing was written.
    Duplicate,
}

#[async_trait]
pub trait ArticlesRepo: Send + Sync {
    async fn find_by_pointer(&self, pointer: &str) -> Result<Option<ArticleRecord>, RepoError>;

    /// Return exactly the subset of `pointers` that currently have an article.
    async fn existing_pointers(&self, pointers: &[String]) -> Result<HashSet<String>, RepoError>;
}

#[async_trait]
pub trait ArticlesWriteRepo: Send + Sync {
    /// Store the article and credit `discovered_by` with one discovery.
    /// Both happen atomically: on error neither is visible.
    async fn create_article(&self, params: CreateArticleParams)
    -> Result<CreateOutcome, RepoError>;
}

#[async_trait]
pub trait DiscoveriesRepo: Send + Sync {
    /// Credit a user with one discovery outside of article creation.
    async fn record_discovery(&self, user_id: &str, pointer: &str) -> Result<(), RepoError>;

    async fn find_discoverer(&self, user_id: &str) -> Result<Option<DiscovererRecord>, RepoError>;

    async fn site_stats(&self) -> Result<SiteStats, RepoError>;
}
