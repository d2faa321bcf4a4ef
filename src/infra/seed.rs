//! Bundled home article, written at startup if it does not exist yet.

use tracing::{debug, info};

use crate::application::repos::{
    ArticlesWriteRepo, CreateArticleParams, CreateOutcome, RepoError,
};
use crate::application::sanitize::sanitize_article_html;
use crate::domain::pointer::{display_title, normalize_word};

const HOME_ARTICLE_HTML: &str = include_str!("../../content/default_article.html");

/// Credited with the bundled home article.
pub const HOME_ARTICLE_AUTHOR: &str = "Lau&Five";

/// Store the bundled home article under `home_title`. Returns `true` when
/// this call created it.
pub async fn seed_home_article(
    writer: &dyn ArticlesWriteRepo,
    home_title: &str,
) -> Result<bool, RepoError> {
    let pointer = normalize_word(home_title);
    if pointer.is_empty() {
        return Err(RepoError::InvalidInput {
            message: format!("home title `{home_title}` has no pointer"),
        });
    }

    let outcome = writer
        .create_article(CreateArticleParams {
            pointer: pointer.clone(),
            name: display_title(home_title),
            body_html: sanitize_article_html(HOME_ARTICLE_HTML),
            discovered_by: HOME_ARTICLE_AUTHOR.to_string(),
        })
        .await?;

    match outcome {
        CreateOutcome::Created(_) => {
            info!(
                target = "infinitewiki::infra::seed",
                pointer = %pointer,
                "home article seeded"
            );
            Ok(true)
        }
        CreateOutcome::Duplicate => {
            debug!(
                target = "infinitewiki::infra::seed",
                pointer = %pointer,
                "home article already present"
            );
            Ok(false)
        }
    }
}
