use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use time::macros::format_description;

use crate::application::error::{ErrorReport, HttpError};
use crate::application::wiki::ArticleView;
use crate::domain::entities::SiteStats;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Render `error` as a full page, keeping its report for the response logger.
pub fn render_error_response(chrome: LayoutChrome, error: HttpError) -> Response {
    let status = error.status();
    let content = ErrorPageView::new(status, error.public_message());
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, status);
    error.into_report().attach(&mut response);
    response
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let content = ErrorPageView::new(StatusCode::NOT_FOUND, "Nothing lives at this address.");
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Site-wide counters shown in the footer of every page.
#[derive(Clone, Debug, Default)]
pub struct StatsView {
    pub total_articles: i64,
    pub total_discoverers: i64,
    pub most_active: Option<String>,
}

impl From<&SiteStats> for StatsView {
    fn from(stats: &SiteStats) -> Self {
        Self {
            total_articles: stats.total_articles,
            total_discoverers: stats.total_discoverers,
            most_active: stats
                .most_active
                .as_ref()
                .map(|top| format!("{} ({})", top.user_id, top.discoveries)),
        }
    }
}

/// Everything the layout renders around the page content.
#[derive(Clone, Debug)]
pub struct LayoutChrome {
    pub site_title: String,
    pub user: String,
    /// Absent when the statistics could not be loaded.
    pub stats: Option<StatsView>,
}

pub struct LayoutContext<T> {
    pub site_title: String,
    pub user: String,
    pub stats: Option<StatsView>,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            site_title: chrome.site_title,
            user: chrome.user,
            stats: chrome.stats,
            content,
        }
    }
}

pub struct ArticlePageView {
    pub title: String,
    pub pointer: String,
    pub body_html: String,
    pub discovered_by: String,
    pub discovered_on: String,
    pub live_links: usize,
    pub total_links: usize,
    pub newly_discovered: bool,
}

impl From<ArticleView> for ArticlePageView {
    fn from(article: ArticleView) -> Self {
        let discovered_on = article
            .discovery_time
            .format(format_description!("[year]-[month]-[day]"))
            .unwrap_or_default();

        Self {
            total_links: article.links.len(),
            title: article.title,
            pointer: article.pointer,
            body_html: article.body_html,
            discovered_by: article.discovered_by,
            discovered_on,
            live_links: article.live_links,
            newly_discovered: article.created,
        }
    }
}

#[derive(Template)]
#[template(path = "article.html")]
pub struct ArticleTemplate {
    pub view: LayoutContext<ArticlePageView>,
}

pub struct ErrorPageView {
    pub status: u16,
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status: status.as_u16(),
            title: status
                .canonical_reason()
                .unwrap_or("Something went wrong")
                .to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::application::wiki::LinkView;
    use crate::domain::entities::MostActiveDiscoverer;

    fn chrome() -> LayoutChrome {
        LayoutChrome {
            site_title: "Infinite Wiki".to_string(),
            user: "ada".to_string(),
            stats: Some(StatsView::from(&SiteStats {
                total_articles: 12,
                total_discoverers: 3,
                most_active: Some(MostActiveDiscoverer {
                    user_id: "grace".to_string(),
                    discoveries: 7,
                }),
            })),
        }
    }

    #[test]
    fn article_page_renders_linked_body_unescaped() {
        let article = ArticleView {
            title: "Photosynthesis".to_string(),
            pointer: "photosynthesis".to_string(),
            body_html: "<p><a class=\"wiki-link\" href=\"/article/leaf\">Leaf</a> & light</p>"
                .to_string(),
            discovered_by: "ada".to_string(),
            discovery_time: datetime!(2026-10-18 09:30 UTC),
            links: vec![LinkView {
                word: "Leaf".to_string(),
                pointer: "leaf".to_string(),
                live: true,
            }],
            live_links: 1,
            created: true,
        };
        let view = LayoutContext::new(chrome(), ArticlePageView::from(article));
        let html = ArticleTemplate { view }.render().expect("render");

        assert!(html.contains("<a class=\"wiki-link\" href=\"/article/leaf\">Leaf</a>"));
        assert!(html.contains("2026-10-18"));
        assert!(html.contains("grace (7)"));
    }

    #[test]
    fn error_page_shows_public_message_only() {
        let error = HttpError::new(
            "test",
            StatusCode::SERVICE_UNAVAILABLE,
            "Article unavailable, retry later",
            "upstream returned 502",
        );
        let response = render_error_response(chrome(), error);

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert_eq!(report.messages, vec!["upstream returned 502".to_string()]);
    }

    #[test]
    fn stats_view_formats_most_active() {
        let view = StatsView::from(&SiteStats::default());
        assert_eq!(view.total_articles, 0);
        assert!(view.most_active.is_none());
    }
}
