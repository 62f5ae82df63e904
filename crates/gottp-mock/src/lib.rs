// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! The Mock Responder (§4.8): an HTTP listener that linearly matches
//! incoming requests against a flattened collection by method and path
//! template, serving each match's stored body back as a canned response.
//!
//! Built on `axum`, used here in the role of a client-side test double
//! rather than a production control plane.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use gottp_collection::{Collection, FlatItemKind, Request as StoredRequest};
use gottp_error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Mock server configuration (§4.8).
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// TCP port to bind on `127.0.0.1`.
    pub port: u16,
    /// Artificial latency injected before every response.
    pub latency: Option<Duration>,
    /// Probability in `[0, 1]` of returning an injected `500` instead of the
    /// matched response. Clamped to `[0, 1]` on construction.
    pub error_rate: f64,
    /// Value for the `Access-Control-Allow-Origin` response header. `"*"`
    /// (the default) allows any origin.
    pub cors_allow_origin: String,
}

impl MockConfig {
    /// Construct a config for `port` with no latency, no error injection, and
    /// CORS open to any origin.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            latency: None,
            error_rate: 0.0,
            cors_allow_origin: "*".to_string(),
        }
    }
}

struct MockState {
    collection: Collection,
    config: MockConfig,
}

/// Build the mock responder's `axum` router over `collection`, without
/// binding a listener. Exposed separately from [`serve`] so tests can drive
/// the router in-process.
pub fn build_app(collection: Collection, config: MockConfig) -> Router {
    let cors = cors_layer(&config.cors_allow_origin);
    let state = Arc::new(MockState { collection, config });
    Router::new()
        .route("/", any(handle))
        .route("/{*rest}", any(handle))
        .with_state(state)
        .layer(cors)
}

fn cors_layer(allow_origin: &str) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allow_origin == "*" {
        layer.allow_origin(AllowOrigin::any())
    } else {
        match HeaderValue::from_str(allow_origin) {
            Ok(value) => layer.allow_origin(AllowOrigin::exact(value)),
            Err(_) => layer.allow_origin(AllowOrigin::any()),
        }
    }
}

/// Bind a listener on `127.0.0.1:{config.port}` and serve `collection`'s
/// requests as canned responses until `cancel` fires.
pub async fn serve(collection: Collection, config: MockConfig, cancel: CancellationToken) -> Result<(), Error> {
    let bind = format!("127.0.0.1:{}", config.port);
    let app = build_app(collection, config);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| Error::internal(format!("failed to bind mock listener on {bind}")).with_source(Box::new(e)))?;
    info!(bind = %bind, "gottp mock responder listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::internal("mock responder failed").with_source(Box::new(e)))
}

async fn handle(State(state): State<Arc<MockState>>, req: Request<Body>) -> Response {
    if let Some(latency) = state.config.latency {
        tokio::time::sleep(latency).await;
    }

    if state.config.error_rate > 0.0 && rand::random::<f64>() < state.config.error_rate {
        return (StatusCode::INTERNAL_SERVER_ERROR, "gottp mock: injected error").into_response();
    }

    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();

    match find_match(&state.collection, &method, &path) {
        Some(matched) => render_response(&state.collection, &matched),
        None => {
            warn!(method = %method, path = %path, "gottp mock: no matching request");
            (StatusCode::NOT_FOUND, "gottp mock: no matching request").into_response()
        }
    }
}

/// Linearly search the flattened collection for the first Request whose
/// method matches and whose URL path template matches `path` (§4.8).
fn find_match(collection: &Collection, method: &str, path: &str) -> Option<StoredRequest> {
    collection.flatten().into_iter().find_map(|flat| match flat.kind {
        FlatItemKind::Request(request) if request.method.eq_ignore_ascii_case(method) && path_matches(&url_path(&request.url), path) => Some(request),
        _ => None,
    })
}

fn url_path(url: &str) -> String {
    url::Url::parse(url).map(|u| u.path().to_string()).unwrap_or_else(|_| url.to_string())
}

/// Compare a stored request's path template against an incoming request
/// path, treating any `{{...}}` segment as a wildcard matching exactly one
/// path segment.
fn path_matches(template: &str, incoming: &str) -> bool {
    let template_segments: Vec<&str> = template.trim_matches('/').split('/').collect();
    let incoming_segments: Vec<&str> = incoming.trim_matches('/').split('/').collect();
    if template_segments.len() != incoming_segments.len() {
        return false;
    }
    template_segments
        .iter()
        .zip(incoming_segments.iter())
        .all(|(t, i)| (t.starts_with("{{") && t.ends_with("}}")) || t == i)
}

fn render_response(collection: &Collection, request: &StoredRequest) -> Response {
    let Some(body) = &request.body else {
        return StatusCode::OK.into_response();
    };
    if body.is_empty() {
        return StatusCode::OK.into_response();
    }

    let rendered = gottp_vars::resolve(&body.content, gottp_vars::Scope::new(None, collection));
    let mut response = (StatusCode::OK, rendered).into_response();
    if let Some(mime) = body.body_type.mime() {
        if let Ok(value) = HeaderValue::from_str(mime) {
            response.headers_mut().insert(axum::http::header::CONTENT_TYPE, value);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use gottp_collection::{Body, Item};
    use tower::ServiceExt;

    fn demo_collection() -> Collection {
        let mut collection = Collection::new("Demo");
        let mut request = gottp_collection::Request::new("Get user", "GET", "https://api.example.com/users/{{id}}");
        request.body = Some(Body::json(r#"{"id":"{{$uuid}}"}"#));
        collection.items.push(Item::Request(request));
        collection
    }

    #[test]
    fn path_matches_treats_double_brace_segment_as_wildcard() {
        assert!(path_matches("/users/{{id}}", "/users/42"));
        assert!(!path_matches("/users/{{id}}", "/users/42/extra"));
        assert!(!path_matches("/users/{{id}}", "/teams/42"));
    }

    #[test]
    fn find_match_is_case_insensitive_on_method() {
        let collection = demo_collection();
        assert!(find_match(&collection, "get", "/users/42").is_some());
        assert!(find_match(&collection, "POST", "/users/42").is_none());
    }

    #[test]
    fn find_match_returns_none_for_unmatched_path() {
        let collection = demo_collection();
        assert!(find_match(&collection, "GET", "/teams/42").is_none());
    }

    #[tokio::test]
    async fn matched_route_serves_templated_body() {
        let collection = demo_collection();
        let app = build_app(collection, MockConfig::new(0));
        let request = Request::builder().method("GET").uri("/users/42").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let id = parsed["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn unmatched_route_is_404() {
        let collection = demo_collection();
        let app = build_app(collection, MockConfig::new(0));
        let request = Request::builder().method("GET").uri("/nope").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn full_error_rate_forces_500() {
        let collection = demo_collection();
        let mut config = MockConfig::new(0);
        config.error_rate = 1.0;
        let app = build_app(collection, config);
        let request = Request::builder().method("GET").uri("/users/42").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn no_body_request_serves_empty_200() {
        let mut collection = Collection::new("Demo");
        collection.items.push(Item::Request(gottp_collection::Request::new("Ping", "GET", "https://example.com/ping")));
        let app = build_app(collection, MockConfig::new(0));
        let request = Request::builder().method("GET").uri("/ping").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
