//! Inbound side of the gateway: the catch-all axum route.
//!
//! Every method on every path under the configured prefix is resolved into a
//! [`ForwardRequest`], sent through the [`Upstream`], and the backend's
//! status and body are relayed back as-is.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use serde_json::json;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::forward::{ForwardRequest, InboundBody};
use crate::logging_layer::logging_layer;
use crate::proxy_service::{ProxyService, Upstream};

/// Shared, read-only state for every gateway request.
pub struct GatewayState {
    /// Gateway configuration
    pub config: Arc<GatewayConfig>,
    /// Backend hop
    pub upstream: Arc<dyn Upstream>,
}

impl GatewayState {
    /// State backed by a real [`ProxyService`].
    pub fn new(config: GatewayConfig) -> Self {
        let upstream = Arc::new(ProxyService::new(&config));
        Self {
            config: Arc::new(config),
            upstream,
        }
    }

    /// State with a caller-provided upstream.
    pub fn with_upstream(config: GatewayConfig, upstream: Arc<dyn Upstream>) -> Self {
        Self {
            config: Arc::new(config),
            upstream,
        }
    }
}

/// Build the gateway router.
///
/// Routes:
/// - `{prefix}`, `{prefix}/` and `{prefix}/{*path}` for every method
/// - `GET /healthz` liveness probe, answered locally
pub fn router(state: GatewayState) -> Router {
    let max_body = state.config.max_body_bytes;
    let prefix = state.config.prefix.trim_end_matches('/').to_string();

    let mut routes = Router::new().route("/healthz", get(healthz));
    if prefix.is_empty() {
        routes = routes
            .route("/", any(forward))
            .route("/{*path}", any(forward));
    } else {
        routes = routes
            .route(&prefix, any(forward))
            .route(&format!("{}/", prefix), any(forward))
            .route(&format!("{}/{{*path}}", prefix), any(forward));
    }

    routes
        .layer(DefaultBodyLimit::max(max_body))
        .layer(logging_layer())
        .with_state(Arc::new(state))
}

/// Local liveness probe. Never touches the backend.
async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// Catch-all forwarding handler.
async fn forward(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let config = &state.config;
    let request = match ForwardRequest::from_inbound(
        method,
        &uri,
        &headers,
        InboundBody::from_bytes(body),
        config,
    ) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %config.credential.redact(&e.to_string()), "Failed to build backend request");
            return e.to_response(&config.credential);
        }
    };

    info!(
        method = %request.method,
        target = %request.target,
        "Proxying request"
    );

    match state.upstream.send(request).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            error!(
                error = %config.credential.redact(&e.to_string()),
                code = e.code(),
                "Forwarding failed"
            );
            e.to_response(&config.credential)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use crate::error::{GatewayError, GatewayResult};
    use crate::forward::ForwardResponse;
    use axum::body::Body;
    use http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use url::Url;

    /// Upstream that records what it was asked to send.
    #[derive(Default)]
    struct RecordingUpstream {
        seen: Mutex<Vec<ForwardRequest>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Upstream for RecordingUpstream {
        async fn send(&self, request: ForwardRequest) -> GatewayResult<ForwardResponse> {
            self.seen.lock().expect("lock").push(request);
            if self.fail {
                return Err(GatewayError::Connection {
                    reason: "dns error: failed to lookup address information".to_string(),
                });
            }
            Ok(ForwardResponse {
                status: StatusCode::NOT_FOUND,
                content_type: None,
                body: Bytes::from_static(b"not found"),
            })
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig::new(
            Url::parse("http://backend:8080").expect("url"),
            Credential::new("server-secret").expect("secret"),
        )
    }

    fn app(upstream: Arc<RecordingUpstream>) -> Router {
        router(GatewayState::with_upstream(config(), upstream))
    }

    async fn body_string(response: Response) -> String {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("should collect body")
            .to_bytes();
        String::from_utf8(bytes.to_vec()).expect("should be utf8")
    }

    #[tokio::test]
    async fn test_backend_status_and_body_pass_through() {
        let upstream = Arc::new(RecordingUpstream::default());
        let request = Request::builder()
            .method("GET")
            .uri("/api/sift/digest?email=a%40b.c")
            .body(Body::empty())
            .expect("request");

        let response = app(upstream.clone())
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, "not found");

        let seen = upstream.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].target.to_string(),
            "http://backend:8080/digest?email=a%40b.c"
        );
    }

    #[tokio::test]
    async fn test_post_body_and_headers_are_prepared() {
        let upstream = Arc::new(RecordingUpstream::default());
        let request = Request::builder()
            .method("POST")
            .uri("/api/sift/mode")
            .header("host", "gateway.local")
            .header("x-api-key", "forged")
            .body(Body::from(r#"{"email":"a@b.c","shadow":false}"#))
            .expect("request");

        app(upstream.clone())
            .oneshot(request)
            .await
            .expect("response");

        let seen = upstream.seen.lock().expect("lock");
        let forwarded = &seen[0];
        assert_eq!(forwarded.method, Method::POST);
        assert_eq!(
            forwarded.body.as_deref(),
            Some(&br#"{"email":"a@b.c","shadow":false}"#[..])
        );
        assert_eq!(forwarded.headers["x-api-key"], "server-secret");
        assert_eq!(forwarded.headers["content-type"], "application/json");
        assert!(forwarded.headers.get("host").is_none());
    }

    #[tokio::test]
    async fn test_any_method_and_empty_path() {
        let upstream = Arc::new(RecordingUpstream::default());
        for (method, uri) in [("DELETE", "/api/sift"), ("PATCH", "/api/sift/")] {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .expect("request");
            app(upstream.clone())
                .oneshot(request)
                .await
                .expect("response");
        }

        let seen = upstream.seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|r| r.target.to_string() == "http://backend:8080/"));
        assert_eq!(seen[0].body.as_deref(), Some(&b"{}"[..]));
    }

    #[tokio::test]
    async fn test_forwarding_failure_becomes_proxy_error() {
        let upstream = Arc::new(RecordingUpstream {
            fail: true,
            ..Default::default()
        });
        let request = Request::builder()
            .uri("/api/sift/mode?email=a%40b.c")
            .body(Body::empty())
            .expect("request");

        let response = app(upstream).oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value =
            serde_json::from_str(&body_string(response).await).expect("json");
        assert_eq!(body["error"], "proxy_error");
        assert!(
            body["detail"]
                .as_str()
                .expect("detail")
                .contains("dns error")
        );
    }

    #[tokio::test]
    async fn test_paths_outside_prefix_are_not_forwarded() {
        let upstream = Arc::new(RecordingUpstream::default());
        let request = Request::builder()
            .uri("/mode")
            .body(Body::empty())
            .expect("request");

        let response = app(upstream.clone())
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(upstream.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_healthz_is_local() {
        let upstream = Arc::new(RecordingUpstream::default());
        let request = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .expect("request");

        let response = app(upstream.clone())
            .oneshot(request)
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(upstream.seen.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let upstream = Arc::new(RecordingUpstream::default());
        let mut config = config();
        config.max_body_bytes = 16;
        let app = router(GatewayState::with_upstream(config, upstream.clone()));

        let request = Request::builder()
            .method("POST")
            .uri("/api/sift/rules/allow")
            .body(Body::from(vec![b'x'; 64]))
            .expect("request");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(upstream.seen.lock().expect("lock").is_empty());
    }
}
