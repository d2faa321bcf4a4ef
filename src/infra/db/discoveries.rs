use async_trait::async_trait;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::repos::{DiscoveriesRepo, RepoError};
use crate::domain::entities::{DiscovererRecord, MostActiveDiscoverer, SiteStats};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct DiscovererRow {
    user_id: String,
    discoveries: i64,
    last_active_at: OffsetDateTime,
}

impl From<DiscovererRow> for DiscovererRecord {
    fn from(row: DiscovererRow) -> Self {
        Self {
            user_id: row.user_id,
            discoveries: row.discoveries,
            last_active_at: row.last_active_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TotalsRow {
    total_articles: i64,
    total_discoverers: i64,
}

/// Bump `user_id`'s discovery tally on any Postgres executor, so article
/// creation can run it inside its own transaction.
pub(super) async fn credit_discoverer<'e, E>(executor: E, user_id: &str) -> Result<(), RepoError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO discoverers (user_id, discoveries, last_active_at)
        VALUES ($1, 1, now())
        ON CONFLICT (user_id) DO UPDATE
        SET discoveries = discoverers.discoveries + 1,
            last_active_at = EXCLUDED.last_active_at
        "#,
    )
    .bind(user_id)
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;
    Ok(())
}

#[async_trait]
impl DiscoveriesRepo for PostgresRepositories {
    async fn record_discovery(&self, user_id: &str, pointer: &str) -> Result<(), RepoError> {
        credit_discoverer(self.pool(), user_id).await?;
        debug!(
            target = "infinitewiki::infra::db::discoveries",
            user_id, pointer, "discovery recorded"
        );
        Ok(())
    }

    async fn find_discoverer(&self, user_id: &str) -> Result<Option<DiscovererRecord>, RepoError> {
        let row = sqlx::query_as::<_, DiscovererRow>(
            "SELECT user_id, discoveries, last_active_at FROM discoverers WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(DiscovererRecord::from))
    }

    async fn site_stats(&self) -> Result<SiteStats, RepoError> {
        let totals = sqlx::query_as::<_, TotalsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM articles) AS total_articles,
                (SELECT COUNT(*) FROM discoverers WHERE discoveries > 0) AS total_discoverers
            "#,
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let most_active = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT user_id, discoveries
            FROM discoverers
            WHERE discoveries > 0
            ORDER BY discoveries DESC, user_id ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .map(|(user_id, discoveries)| MostActiveDiscoverer {
            user_id,
            discoveries,
        });

        Ok(SiteStats {
            total_articles: totals.total_articles,
            total_discoverers: totals.total_discoverers,
            most_active,
        })
    }
}
