use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::warn;
use url::form_urlencoded::byte_serialize;

use crate::{
    application::{
        error::HttpError,
        stats::StatsService,
        wiki::{ArticleView, WikiService},
    },
    presentation::views::{
        ArticlePageView, ArticleTemplate, LayoutChrome, LayoutContext, StatsView,
        render_error_response, render_not_found_response, render_template_response,
    },
};

use super::{
    HealthProbe, db_health_response,
    middleware::{log_responses, set_request_context},
};

/// Header naming the visitor credited with discoveries.
pub const USER_HEADER: &str = "x-wiki-user";

const MAX_USER_CHARS: usize = 64;

#[derive(Clone)]
pub struct HttpState {
    pub wiki: Arc<WikiService>,
    pub stats: Arc<StatsService>,
    pub health: Arc<dyn HealthProbe>,
    pub default_user: String,
    pub home_title: String,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/article/{title}", get(article_page))
        .route("/search", get(search))
        .route("/api/articles/{title}", get(api_article))
        .route("/api/stats", get(api_stats))
        .route("/api/users/{user}", get(api_user))
        .route("/_health/db", get(public_health))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchQuery {
    q: Option<String>,
}

async fn home(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let title = state.home_title.clone();
    article_response(&state, &headers, &title).await
}

async fn article_page(
    State(state): State<HttpState>,
    Path(title): Path<String>,
    headers: HeaderMap,
) -> Response {
    article_response(&state, &headers, &title).await
}

async fn article_response(state: &HttpState, headers: &HeaderMap, title: &str) -> Response {
    let user = requesting_user(headers, &state.default_user);
    let result = state.wiki.article(title, &user).await;
    let chrome = layout_chrome(state, user).await;

    match result {
        Ok(article) => {
            let view = LayoutContext::new(chrome, ArticlePageView::from(article));
            render_template_response(ArticleTemplate { view }, StatusCode::OK)
        }
        Err(err) => render_error_response(chrome, HttpError::from(err)),
    }
}

async fn search(Query(query): Query<SearchQuery>) -> Redirect {
    match query.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => Redirect::to(&format!("/article/{}", encode_segment(q))),
        _ => Redirect::to("/"),
    }
}

async fn api_article(
    State(state): State<HttpState>,
    Path(title): Path<String>,
    headers: HeaderMap,
) -> Result<Json<ArticleView>, HttpError> {
    let user = requesting_user(&headers, &state.default_user);
    let article = state.wiki.article(&title, &user).await?;
    Ok(Json(article))
}

async fn api_stats(State(state): State<HttpState>) -> Response {
    match state.stats.site_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn api_user(State(state): State<HttpState>, Path(user): Path<String>) -> Response {
    match state.stats.user_stats(&user).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => HttpError::new(
            "infra::http::public::api_user",
            StatusCode::NOT_FOUND,
            "User has no discoveries",
            format!("no discoverer record for `{user}`"),
        )
        .into_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn public_health(State(state): State<HttpState>) -> Response {
    db_health_response(state.health.ping().await)
}

async fn fallback(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    let user = requesting_user(&headers, &state.default_user);
    render_not_found_response(layout_chrome(&state, user).await)
}

/// Page chrome for `user`. Statistics are decoration: when they cannot be
/// loaded the page renders without them.
async fn layout_chrome(state: &HttpState, user: String) -> LayoutChrome {
    let stats = match state.stats.site_stats().await {
        Ok(stats) => Some(StatsView::from(&stats)),
        Err(err) => {
            warn!(
                target = "infinitewiki::http::chrome",
                error = %err,
                "site statistics unavailable"
            );
            None
        }
    };

    LayoutChrome {
        site_title: state.home_title.clone(),
        user,
        stats,
    }
}

/// The visitor named by [`USER_HEADER`], or `default_user` when the header
/// is missing, blank, not UTF-8 or too long.
fn requesting_user(headers: &HeaderMap, default_user: &str) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|user| !user.is_empty() && user.chars().count() <= MAX_USER_CHARS)
        .unwrap_or(default_user)
        .to_string()
}

fn encode_segment(value: &str) -> String {
    byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
