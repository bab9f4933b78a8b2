//! Mock Sift backend for integration testing.
//!
//! Records every request it receives and answers the handful of endpoints
//! the tests exercise. Behaviour can be tuned per test:
//! - a forced `shadow` value the backend echoes regardless of the request
//! - a forced `dry_run` value for batch results
//! - gzip responses whenever the request's `accept-encoding` allows it
//!
//! Some accessors are only used by a subset of tests.

#![allow(dead_code)]

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tower_http::compression::CompressionLayer;

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Mock backend builder.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    forced_shadow: Option<bool>,
    forced_dry_run: Option<bool>,
    compress: bool,
}

#[derive(Debug)]
struct MockState {
    forced_shadow: Option<bool>,
    forced_dry_run: Option<bool>,
    shadow: RwLock<bool>,
    requests: RwLock<Vec<RecordedRequest>>,
}

impl MockBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Echo this `shadow` value from `POST mode` whatever was requested.
    #[must_use]
    pub fn with_forced_shadow(mut self, shadow: bool) -> Self {
        self.forced_shadow = Some(shadow);
        self
    }

    /// Echo this `dry_run` value from batch-classify whatever was requested.
    #[must_use]
    pub fn with_forced_dry_run(mut self, dry_run: bool) -> Self {
        self.forced_dry_run = Some(dry_run);
        self
    }

    /// Compress responses the way a production server in front of the
    /// backend would.
    #[must_use]
    pub fn with_compression(mut self) -> Self {
        self.compress = true;
        self
    }

    /// Start the mock backend and return its address and handle.
    pub async fn start(self) -> (SocketAddr, MockBackendHandle) {
        let state = Arc::new(MockState {
            forced_shadow: self.forced_shadow,
            forced_dry_run: self.forced_dry_run,
            shadow: RwLock::new(true),
            requests: RwLock::new(Vec::new()),
        });

        let mut app = Router::new().fallback(handle).with_state(state.clone());
        if self.compress {
            app = app.layer(CompressionLayer::new());
        }

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (
            addr,
            MockBackendHandle {
                state,
                _handle: handle,
            },
        )
    }
}

/// Handle to the running mock backend.
pub struct MockBackendHandle {
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockBackendHandle {
    pub async fn request_count(&self) -> usize {
        self.state.requests.read().await.len()
    }

    pub async fn last_request(&self) -> Option<RecordedRequest> {
        self.state.requests.read().await.last().cloned()
    }
}

fn json_response(status: StatusCode, body: Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.requests.write().await.push(RecordedRequest {
        method: method.clone(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers,
        body: body.clone(),
    });

    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    match (method, uri.path()) {
        (Method::GET, "/mode") => {
            let shadow = *state.shadow.read().await;
            json_response(StatusCode::OK, json!({ "email": "ops@example.com", "shadow": shadow }))
        }
        (Method::POST, "/mode") => {
            let requested = request["shadow"].as_bool().unwrap_or(true);
            let shadow = state.forced_shadow.unwrap_or(requested);
            *state.shadow.write().await = shadow;
            json_response(
                StatusCode::OK,
                json!({ "email": request["email"], "shadow": shadow }),
            )
        }
        (Method::POST, "/gmail/batch-classify") => {
            let requested = request["dry_run"].as_bool().unwrap_or(true);
            let dry_run = state.forced_dry_run.unwrap_or(requested);
            let action = if dry_run { "would_quarantine" } else { "quarantine" };
            json_response(
                StatusCode::OK,
                json!({
                    "email": request["email"],
                    "label": request["label"],
                    "threshold": request["quarantine_threshold"],
                    "dry_run": dry_run,
                    "count": 2,
                    "items": [
                        { "id": "m1", "score": 0.92, "reasons": ["lookalike_domain"], "action": action },
                        { "id": "m2", "score": 0.05, "reasons": [], "action": "none" }
                    ]
                }),
            )
        }
        (Method::GET, "/rules") => json_response(
            StatusCode::OK,
            json!({ "allow": ["partner.example"], "block": [] }),
        ),
        (Method::GET, "/plain") => "plain text".into_response(),
        (Method::GET, "/echo") | (Method::POST, "/echo") => json_response(
            StatusCode::OK,
            json!({ "query": uri.query(), "body": String::from_utf8_lossy(&body) }),
        ),
        _ => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}
