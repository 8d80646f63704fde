//! HTTP server over the built site
//!
//! Static asset trees are mounted directly. Everything else goes through
//! [`dispatch`], which consults the routing trie of the current site
//! snapshot before falling back to the destination tree.

use std::{
    path::{Component, Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use percent_encoding::percent_decode_str;
use quire_generator::{Site, assets::asset_dirs};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower::ServiceExt;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
};

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const NOT_FOUND_BODY: &str = "404 - 页面未找到";

/// Shared handle to the most recent successful build.
#[derive(Clone)]
pub struct AppState {
    site: Arc<RwLock<Arc<Site>>>,
}

impl AppState {
    pub fn new(site: Site) -> Self {
        Self {
            site: Arc::new(RwLock::new(Arc::new(site))),
        }
    }

    /// Swap in a freshly built site. In-flight requests keep the old one.
    pub fn replace(&self, site: Site) {
        let mut guard = self.site.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(site);
    }

    pub fn snapshot(&self) -> Arc<Site> {
        Arc::clone(&self.site.read().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Create the site router.
pub fn create_router(state: AppState) -> Router {
    let destination = state.snapshot().config.destination.clone();

    let mut router = Router::new().route(
        "/api/search",
        get(search).layer(CorsLayer::permissive()),
    );
    for dir in asset_dirs() {
        router = router.nest_service(&format!("/{dir}"), ServeDir::new(destination.join(dir)));
    }

    router.fallback(dispatch).with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    title: String,
    url: String,
    date: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchHit>,
    count: usize,
}

/// `GET /api/search?q=<prefix>`
async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    if params.q.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "查询参数不能为空" })),
        )
            .into_response();
    }

    let site = state.snapshot();
    let results: Vec<SearchHit> = site
        .search(&params.q)
        .into_iter()
        .map(|post| SearchHit {
            title: post.title.clone(),
            url: post.url.clone(),
            date: post.date.format("%Y-%m-%d").to_string(),
        })
        .collect();
    tracing::debug!(query = %params.q, hits = results.len(), "Search");

    Json(SearchResponse {
        query: params.q,
        count: results.len(),
        results,
    })
    .into_response()
}

/// Catch-all handler: routed post, exact file, `.html` sibling, directory index.
async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let path = percent_decode_str(request.uri().path())
        .decode_utf8_lossy()
        .into_owned();
    let site = state.snapshot();
    let destination = &site.config.destination;

    if let Some(file) = site
        .lookup(&path)
        .and_then(|post| resolve(destination, &post.relative_url))
    {
        if is_file(&file).await {
            return serve(file, request, true).await;
        }
    }

    let Some(file) = resolve(destination, &path) else {
        tracing::debug!(path = %path, "Rejected request path");
        return not_found();
    };

    if is_file(&file).await {
        return serve(file, request, false).await;
    }

    let trimmed = path.trim_matches('/');
    if !trimmed.is_empty() && !path.ends_with(".html") {
        let sibling = destination.join(format!("{trimmed}.html"));
        if is_file(&sibling).await {
            return serve(sibling, request, true).await;
        }
    }

    let index = file.join("index.html");
    if is_file(&index).await {
        return serve(index, request, true).await;
    }

    not_found()
}

/// Map a URL path under `root`, refusing anything but plain segments.
fn resolve(root: &Path, url_path: &str) -> Option<PathBuf> {
    let relative = Path::new(url_path.trim_start_matches('/'));
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

async fn serve(file: PathBuf, request: Request, html: bool) -> Response {
    let mut response = match ServeFile::new(&file).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    };
    if html && response.status().is_success() {
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(HTML_CONTENT_TYPE),
        );
    }
    response
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::{
        body::{Body, to_bytes},
        http,
    };
    use quire_core::Config;
    use quire_generator::Builder;
    use serde_json::Value;
    use tempfile::TempDir;

    use super::*;

    const LAYOUT: &str = "<!DOCTYPE html><html><head></head><body>{{ content | safe }}</body></html>";

    fn built_site(dir: &TempDir) -> Site {
        let root = dir.path();
        fs::create_dir_all(root.join("_layouts")).unwrap();
        fs::create_dir_all(root.join("_posts")).unwrap();
        fs::create_dir_all(root.join("stylesheets")).unwrap();
        fs::create_dir_all(root.join("about")).unwrap();
        fs::write(root.join("_layouts/default.html"), LAYOUT).unwrap();
        fs::write(root.join("_layouts/post.html"), LAYOUT).unwrap();
        fs::write(root.join("_layouts/index.html"), LAYOUT).unwrap();
        fs::write(
            root.join("_layouts/archive.html"),
            "<html><body>{{ title }}</body></html>",
        )
        .unwrap();
        fs::write(root.join("stylesheets/site.css"), "body { margin: 0 }").unwrap();
        fs::write(root.join("about/index.md"), "---\ntitle: About\n---\nAbout me").unwrap();
        fs::write(
            root.join("_posts/2024-01-15-hello-world.md"),
            "---\ntitle: Hello World\n---\nFirst post",
        )
        .unwrap();
        fs::write(
            root.join("_posts/2024-02-01-second.md"),
            "---\ntitle: Second\n---\nSecond post",
        )
        .unwrap();

        let config = Config {
            source: root.to_path_buf(),
            destination: root.join("_site"),
            url: "http://example.com".to_string(),
            ..Config::default()
        };
        Builder::new(config).build().unwrap()
    }

    async fn get_path(router: Router, uri: &str) -> Response {
        router
            .oneshot(http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_routed_post_is_html() {
        let dir = TempDir::new().unwrap();
        let router = create_router(AppState::new(built_site(&dir)));

        let response = get_path(router.clone(), "/2024/01/15/hello-world.html").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], HTML_CONTENT_TYPE);
        assert!(body_text(response).await.contains("First post"));

        let mirror = get_path(router, "/archives/2024/01/15/hello-world.html").await;
        assert_eq!(mirror.status(), StatusCode::OK);
        assert!(body_text(mirror).await.contains("First post"));
    }

    #[tokio::test]
    async fn test_directory_index_and_html_sibling() {
        let dir = TempDir::new().unwrap();
        let router = create_router(AppState::new(built_site(&dir)));

        let about = get_path(router.clone(), "/about/").await;
        assert_eq!(about.status(), StatusCode::OK);
        assert!(body_text(about).await.contains("About me"));

        let sibling = get_path(router, "/2024/02/01/second").await;
        assert_eq!(sibling.status(), StatusCode::OK);
        assert_eq!(sibling.headers()[header::CONTENT_TYPE], HTML_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_percent_encoded_path() {
        let dir = TempDir::new().unwrap();
        let site = built_site(&dir);
        fs::create_dir_all(dir.path().join("_site/笔记")).unwrap();
        fs::write(dir.path().join("_site/笔记/index.html"), "notes").unwrap();
        let router = create_router(AppState::new(site));

        let response = get_path(router, "/%E7%AC%94%E8%AE%B0/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "notes");
    }

    #[tokio::test]
    async fn test_missing_path_is_404() {
        let dir = TempDir::new().unwrap();
        let router = create_router(AppState::new(built_site(&dir)));

        let response = get_path(router.clone(), "/nope.html").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_text(response).await, NOT_FOUND_BODY);

        let escape = get_path(router, "/../secret").await;
        assert_eq!(escape.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_assets_are_mounted() {
        let dir = TempDir::new().unwrap();
        let router = create_router(AppState::new(built_site(&dir)));

        let response = get_path(router, "/stylesheets/site.css").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "body { margin: 0 }");
    }

    #[tokio::test]
    async fn test_search() {
        let dir = TempDir::new().unwrap();
        let router = create_router(AppState::new(built_site(&dir)));

        let response = router
            .oneshot(
                http::Request::builder()
                    .uri("/api/search?q=/2024")
                    .header(header::ORIGIN, "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["query"], "/2024");
        assert_eq!(body["count"], 2);
        assert_eq!(body["results"][0]["title"], "Second");
        assert_eq!(body["results"][0]["date"], "2024-02-01");
        assert_eq!(body["results"][1]["title"], "Hello World");
    }

    #[tokio::test]
    async fn test_search_counts_mirrored_posts_once() {
        let dir = TempDir::new().unwrap();
        let router = create_router(AppState::new(built_site(&dir)));

        let response = get_path(router, "/api/search?q=/").await;
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let dir = TempDir::new().unwrap();
        let router = create_router(AppState::new(built_site(&dir)));

        for uri in ["/api/search", "/api/search?q="] {
            let response = get_path(router.clone(), uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
            assert_eq!(body["error"], "查询参数不能为空");
        }
    }

    #[tokio::test]
    async fn test_replace_swaps_snapshot() {
        let dir = TempDir::new().unwrap();
        let state = AppState::new(built_site(&dir));
        assert_eq!(state.snapshot().posts.len(), 2);

        fs::write(
            dir.path().join("_posts/2024-03-01-third.md"),
            "---\ntitle: Third\n---\nThird post",
        )
        .unwrap();
        let config = state.snapshot().config.clone();
        state.replace(Builder::new(config).build().unwrap());

        assert_eq!(state.snapshot().posts.len(), 3);
        let response = get_path(create_router(state), "/2024/03/01/third.html").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/srv/site");
        assert_eq!(
            resolve(root, "/a/b.html"),
            Some(PathBuf::from("/srv/site/a/b.html"))
        );
        assert_eq!(resolve(root, "/"), Some(PathBuf::from("/srv/site")));
        assert_eq!(resolve(root, "/a/../../etc/passwd"), None);
    }
}
