mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::LOCATION},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use infinitewiki::application::generator::GenerationError;
use infinitewiki::cache::ReadThroughCache;
use infinitewiki::infra::http::{HttpState, REQUEST_ID_HEADER, USER_HEADER, build_router};

use support::{MemoryStore, ScriptedGenerator, stats_service, wiki_service};

fn router(store: &Arc<MemoryStore>, generator: Arc<ScriptedGenerator>) -> Router {
    let cache = ReadThroughCache::disabled();
    build_router(HttpState {
        wiki: Arc::new(wiki_service(store, generator, cache.clone())),
        stats: Arc::new(stats_service(store, cache)),
        health: store.clone(),
        default_user: "user".to_string(),
        home_title: "Infinite Wiki".to_string(),
    })
}

async fn get(app: &Router, uri: &str, user: Option<&str>) -> axum::response::Response {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(user) = user {
        builder = builder.header(USER_HEADER, user);
    }
    let request = builder.body(Body::empty()).expect("request should build");
    app.clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn home_renders_seeded_article() {
    let store = MemoryStore::new();
    store
        .insert(
            "infinitewiki",
            "Infinite Wiki",
            "<p>Every word is a door.</p>",
            "Lau&Five",
        )
        .await;
    let app = router(&store, ScriptedGenerator::answering("<p>unused</p>"));

    let response = get(&app, "/", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    let html = body_text(response).await;
    assert!(html.contains("<h1>Infinite Wiki</h1>"));
    assert!(html.contains("Lau&amp;Five"));
    assert!(html.contains("href=\"/article/door\""));
    assert!(html.contains("Browsing as user"));
}

#[tokio::test]
async fn article_page_credits_header_user() {
    let store = MemoryStore::new();
    let generator = ScriptedGenerator::answering("<p>Volcanoes erupt magma.</p>");
    let app = router(&store, generator);

    let response = get(&app, "/article/Volcano", Some("ada")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("You just discovered this article."));
    assert_eq!(store.discoveries_of("ada").await, 1);
    assert_eq!(
        store
            .article("volcano")
            .await
            .expect("stored")
            .discovered_by,
        "ada"
    );
}

#[tokio::test]
async fn generation_failure_renders_unavailable_page() {
    let store = MemoryStore::new();
    let generator = ScriptedGenerator::failing(GenerationError::Upstream {
        status: 401,
        message: "invalid key".to_string(),
    });
    let app = router(&store, generator);

    let response = get(&app, "/article/Nebula", None).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let html = body_text(response).await;
    assert!(html.contains("Article unavailable, retry later"));
    assert!(!html.contains("invalid key"));
}

#[tokio::test]
async fn api_article_returns_link_metadata() {
    let store = MemoryStore::new();
    store.insert("dog", "Dog", "<p>Dogs chase every cat.</p>", "grace").await;
    store.insert("cat", "Cat", "<p>Cats nap.</p>", "grace").await;
    let app = router(&store, ScriptedGenerator::answering("<p>unused</p>"));

    let response = get(&app, "/api/articles/dog", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(json["pointer"], "dog");
    assert_eq!(json["discovered_by"], "grace");
    assert_eq!(json["created"], false);
    assert_eq!(json["live_links"], 1);
    let links = json["links"].as_array().expect("links array");
    assert!(
        links
            .iter()
            .any(|link| link["pointer"] == "cat" && link["live"] == true)
    );
    assert!(
        links
            .iter()
            .any(|link| link["pointer"] == "dogs" && link["live"] == false)
    );
}

#[tokio::test]
async fn api_stats_and_user_stats() {
    let store = MemoryStore::new();
    let app = router(&store, ScriptedGenerator::answering("<p>Rivers carve valleys.</p>"));

    let response = get(&app, "/api/users/ada", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(&app, "/api/articles/River", Some("ada")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let stats: Value =
        serde_json::from_str(&body_text(get(&app, "/api/stats", None).await).await).expect("json");
    assert_eq!(stats["total_articles"], 1);
    assert_eq!(stats["total_discoverers"], 1);
    assert_eq!(stats["most_active"]["user_id"], "ada");

    let user: Value = serde_json::from_str(&body_text(get(&app, "/api/users/ada", None).await).await)
        .expect("json");
    assert_eq!(user["discoveries"], 1);
}

#[tokio::test]
async fn search_redirects_to_article() {
    let store = MemoryStore::new();
    let app = router(&store, ScriptedGenerator::answering("<p>unused</p>"));

    let response = get(&app, "/search?q=black+hole", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(LOCATION).expect("location"),
        "/article/black%20hole"
    );

    let response = get(&app, "/search?q=%20%20", None).await;
    assert_eq!(response.headers().get(LOCATION).expect("location"), "/");
}

#[tokio::test]
async fn health_reflects_store_state() {
    let store = MemoryStore::new();
    let app = router(&store, ScriptedGenerator::answering("<p>unused</p>"));

    assert_eq!(
        get(&app, "/_health/db", None).await.status(),
        StatusCode::NO_CONTENT
    );

    store.unavailable.store(true, Ordering::SeqCst);
    assert_eq!(
        get(&app, "/_health/db", None).await.status(),
        StatusCode::SERVICE_UNAVAILABLE
    );
}

#[tokio::test]
async fn pages_render_without_statistics_when_store_is_down() {
    let store = MemoryStore::new();
    store.unavailable.store(true, Ordering::SeqCst);
    let app = router(&store, ScriptedGenerator::answering("<p>unused</p>"));

    let response = get(&app, "/article/dog", None).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let html = body_text(response).await;
    assert!(html.contains("Service temporarily unavailable"));
    assert!(!html.contains("discoverers"));
}

#[tokio::test]
async fn unknown_paths_render_not_found() {
    let store = MemoryStore::new();
    let app = router(&store, ScriptedGenerator::answering("<p>unused</p>"));

    let response = get(&app, "/wp-admin", None).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("Nothing lives at this address."));
}
