use std::collections::HashSet;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    ArticlesRepo, ArticlesWriteRepo, CreateArticleParams, CreateOutcome, RepoError,
};
use crate::domain::entities::ArticleRecord;
use crate::domain::pointer::article_id;

use super::{PostgresRepositories, discoveries::credit_discoverer, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: Uuid,
    pointer: String,
    name: String,
    body_html: String,
    discovered_by: String,
    discovery_time: OffsetDateTime,
}

impl From<ArticleRow> for ArticleRecord {
    fn from(row: ArticleRow) -> Self {
        Self {
            id: row.id,
            pointer: row.pointer,
            name: row.name,
            body_html: row.body_html,
            discovered_by: row.discovered_by,
            discovery_time: row.discovery_time,
        }
    }
}

#[async_trait]
impl ArticlesRepo for PostgresRepositories {
    async fn find_by_pointer(&self, pointer: &str) -> Result<Option<ArticleRecord>, RepoError> {
        let row = sqlx::query_as::<_, ArticleRow>(
            r#"
            SELECT id, pointer, name, body_html, discovered_by, discovery_time
            FROM articles
            WHERE pointer = $1
            "#,
        )
        .bind(pointer)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ArticleRecord::from))
    }

    async fn existing_pointers(&self, pointers: &[String]) -> Result<HashSet<String>, RepoError> {
        if pointers.is_empty() {
            return Ok(HashSet::new());
        }

        let found = sqlx::query_scalar::<_, String>(
            "SELECT pointer FROM articles WHERE pointer = ANY($1)",
        )
        .bind(pointers)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(found.into_iter().collect())
    }
}

#[async_trait]
impl ArticlesWriteRepo for PostgresRepositories {
    async fn create_article(
        &self,
        params: CreateArticleParams,
    ) -> Result<CreateOutcome, RepoError> {
        let CreateArticleParams {
            pointer,
            name,
            body_html,
            discovered_by,
        } = params;

        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        // Any unique conflict (pointer or its derived id) means another
        // writer got there first.
        let inserted = sqlx::query_as::<_, ArticleRow>(
            r#"
            INSERT INTO articles (id, pointer, name, body_html, discovered_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING id, pointer, name, body_html, discovered_by, discovery_time
            "#,
        )
        .bind(article_id(&pointer))
        .bind(&pointer)
        .bind(&name)
        .bind(&body_html)
        .bind(&discovered_by)
        .fetch_optional(tx.as_mut())
        .await
        .map_err(map_sqlx_error);

        let row = match inserted {
            Ok(Some(row)) => row,
            Ok(None) | Err(RepoError::Duplicate { .. }) => return Ok(CreateOutcome::Duplicate),
            Err(err) => return Err(err),
        };

        // The article and its discoverer's tally commit together or not at all.
        credit_discoverer(tx.as_mut(), &discovered_by).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(CreateOutcome::Created(row.into()))
    }
}
