//! HTTP front end
//!
//! A single method-agnostic route. The request path is the package key; the
//! response is the package archive.

pub mod body;
pub mod listen;

pub use body::archive_body;
pub use listen::{ListenSpec, DEFAULT_FD_ENV_PREFIX};

use crate::archive::ArchivePolicy;
use crate::cache::{CommandRetriever, FetchCoordinator, FreshnessOracle, ResourceKey};
use crate::config::Config;
use crate::error::{ProxyError, ProxyResult};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info_span, warn};

/// Media type of successful responses
pub const ARCHIVE_CONTENT_TYPE: &str = "application/x-tar";

const PLACEHOLDER_PAGE: &str = "<html><body>go get proxy</body></html>";

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub coordinator: Arc<FetchCoordinator>,
    pub policy: Arc<ArchivePolicy>,
}

impl AppState {
    pub fn new(coordinator: FetchCoordinator, policy: ArchivePolicy) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            policy: Arc::new(policy),
        }
    }

    /// Wire up the production retriever and policy for `workspace`
    pub fn from_config(config: &Config, workspace: &Path) -> Self {
        let cache = &config.cache;
        let oracle = FreshnessOracle::new(
            workspace.join("src"),
            Duration::from_secs(cache.freshness_secs),
        )
        .with_sentinel(cache.sentinel.clone());
        let retriever =
            CommandRetriever::from_config(&config.retriever, &cache.workspace_env, workspace);
        let policy = ArchivePolicy::from_config(&config.archive, &cache.sentinel);
        Self::new(FetchCoordinator::new(oracle, Arc::new(retriever)), policy)
    }
}

/// Build the proxy router
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(proxy)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            info_span!(
                "request",
                id = %uuid::Uuid::new_v4(),
                method = %request.method(),
                path = %request.uri().path(),
            )
        }))
}

async fn proxy(State(state): State<AppState>, uri: Uri) -> Response {
    let path = uri.path();
    match path {
        "/favicon.ico" | "/robots.txt" => return StatusCode::OK.into_response(),
        _ if path.len() < 2 => return Html(PLACEHOLDER_PAGE).into_response(),
        _ => {}
    }

    let key = match ResourceKey::from_request_path(path) {
        Ok(key) => key,
        Err(e) => {
            warn!("invalid requested path {:?}", path);
            return e.into_response();
        }
    };

    let dir = match state.coordinator.ensure_fresh(&key).await {
        Ok(dir) => dir,
        Err(e) => return e.into_response(),
    };

    (
        [(header::CONTENT_TYPE, ARCHIVE_CONTENT_TYPE)],
        archive_body(dir, Arc::clone(&state.policy)),
    )
        .into_response()
}

/// Serve `router` on `listener` until `shutdown` resolves
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> ProxyResult<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ProxyError::io("serving HTTP", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::FakeRetriever;
    use crate::cache::{Retriever, DEFAULT_WINDOW};
    use flate2::read::GzDecoder;
    use std::io::Cursor;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn state(temp: &TempDir, fake: FakeRetriever) -> (AppState, Arc<FakeRetriever>) {
        let fake = Arc::new(fake);
        let oracle = FreshnessOracle::new(temp.path().join("src"), DEFAULT_WINDOW);
        let coordinator = FetchCoordinator::new(oracle, Arc::clone(&fake) as Arc<dyn Retriever>);
        (AppState::new(coordinator, ArchivePolicy::default()), fake)
    }

    async fn get(state: &AppState, path: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, body.to_vec())
    }

    #[tokio::test]
    async fn browser_noise_is_empty_success() {
        let temp = TempDir::new().unwrap();
        let (state, fake) = state(&temp, FakeRetriever::new(temp.path().join("src")));

        for path in ["/favicon.ico", "/robots.txt"] {
            let (status, _, body) = get(&state, path).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.is_empty());
        }
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn root_serves_placeholder() {
        let temp = TempDir::new().unwrap();
        let (state, _) = state(&temp, FakeRetriever::new(temp.path().join("src")));

        let (status, content_type, body) = get(&state, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/html"));
        assert_eq!(body, PLACEHOLDER_PAGE.as_bytes());
    }

    #[tokio::test]
    async fn unclean_paths_are_rejected_without_retrieval() {
        let temp = TempDir::new().unwrap();
        let (state, fake) = state(&temp, FakeRetriever::new(temp.path().join("src")));

        for path in ["/a/../b", "//a", "/a/", "/a/./b", "/a//b", "/..", "/-x"] {
            let (status, content_type, _) = get(&state, path).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{path}");
            assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
        }
        assert_eq!(fake.calls(), 0);
    }

    #[tokio::test]
    async fn package_is_served_as_archive() {
        let temp = TempDir::new().unwrap();
        let (state, fake) = state(&temp, FakeRetriever::new(temp.path().join("src")));

        let (status, content_type, body) = get(&state, "/example.com/pkg").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(ARCHIVE_CONTENT_TYPE));
        let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(body)));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["main.go"]);

        get(&state, "/example.com/pkg").await;
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn retrieval_failure_is_500_and_cached() {
        let temp = TempDir::new().unwrap();
        let fake = FakeRetriever::new(temp.path().join("src"))
            .failing("exit status: 1", "package example.com/nope: unrecognized import path");
        let (state, fake) = state(&temp, fake);

        let (status, content_type, body) = get(&state, "/example.com/nope").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(content_type.as_deref(), Some("text/plain; charset=utf-8"));
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("unrecognized import path"));

        let (status, _, again) = get(&state, "/example.com/nope").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(String::from_utf8(again).unwrap(), text);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn any_method_is_routed() {
        let temp = TempDir::new().unwrap();
        let (state, _) = state(&temp, FakeRetriever::new(temp.path().join("src")));

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let response = router(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
