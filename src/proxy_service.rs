//! Outbound side of the gateway: sends a [`ForwardRequest`] to the backend.
//!
//! One inbound request maps to exactly one outbound request. There are no
//! retries, no caching and no coalescing; failures are classified and handed
//! back to the caller as [`GatewayError`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::Request;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::forward::{ForwardRequest, ForwardResponse};
use crate::logging_layer::redacted;
use crate::timeout::{BoxError, TimeoutBody, TimeoutConfig, body_timeout};

/// Trait for the backend hop (enables mocking in tests).
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `request` and buffer the full backend response.
    async fn send(&self, request: ForwardRequest) -> GatewayResult<ForwardResponse>;
}

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Pooled HTTP(S) client talking to the backend.
///
/// `Clone` is cheap; clones share the connection pool.
#[derive(Clone)]
pub struct ProxyService {
    client: HttpsClient,
    upstream_timeout: Option<Duration>,
    body_timeouts: TimeoutConfig,
}

impl ProxyService {
    /// Create a proxy service from gateway configuration.
    ///
    /// HTTPS backends are verified against the platform root store. If no
    /// roots can be loaded, plain `http` backends keep working and `https`
    /// handshakes fail as forwarding errors.
    pub fn new(config: &GatewayConfig) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(true);
        http.set_connect_timeout(Some(config.connect_timeout));

        let tls = match HttpsConnectorBuilder::new().with_native_roots() {
            Ok(builder) => builder,
            Err(e) => {
                warn!(error = %e, "No native root certificates, https backends will be rejected");
                let empty = rustls::ClientConfig::builder()
                    .with_root_certificates(rustls::RootCertStore::empty())
                    .with_no_client_auth();
                HttpsConnectorBuilder::new().with_tls_config(empty)
            }
        };
        let https = tls.https_or_http().enable_http1().wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(https);

        Self {
            client,
            upstream_timeout: config.upstream_timeout,
            body_timeouts: TimeoutConfig::new(config.body_chunk_timeout, config.upstream_timeout),
        }
    }

    /// Forward a request and buffer the backend response.
    ///
    /// # Errors
    ///
    /// - `GatewayError::Timeout` if a configured bound expired
    /// - `GatewayError::Connection` if the backend was unreachable
    /// - `GatewayError::Request` / `GatewayError::Body` for anything else
    pub async fn forward(&self, request: ForwardRequest) -> GatewayResult<ForwardResponse> {
        debug!(
            method = %request.method,
            target = %request.target,
            headers = %redacted(&request.headers),
            has_body = request.body.is_some(),
            "Forwarding request to backend"
        );

        let mut outbound = Request::new(Full::new(request.body.unwrap_or_default()));
        *outbound.method_mut() = request.method;
        *outbound.uri_mut() = request.target;
        *outbound.headers_mut() = request.headers;

        let pending = self.client.request(outbound);
        let result = match self.upstream_timeout {
            Some(bound) => tokio::time::timeout(bound, pending).await.map_err(|_| {
                warn!(timeout_ms = bound.as_millis(), "Backend response timed out");
                GatewayError::Timeout {
                    what: "waiting for backend response".to_string(),
                    after: bound,
                }
            })?,
            None => pending.await,
        };

        let response = result.map_err(classify_client_error)?;
        let (parts, body) = response.into_parts();

        let body = TimeoutBody::new(body, self.body_timeouts.clone())
            .collect()
            .await
            .map_err(classify_body_error)?
            .to_bytes();

        debug!(
            status = parts.status.as_u16(),
            body_len = body.len(),
            "Backend response received"
        );

        Ok(ForwardResponse {
            status: parts.status,
            content_type: parts.headers.get(CONTENT_TYPE).cloned(),
            body,
        })
    }
}

#[async_trait]
impl Upstream for ProxyService {
    async fn send(&self, request: ForwardRequest) -> GatewayResult<ForwardResponse> {
        self.forward(request).await
    }
}

/// Classify a hyper-util client error.
fn classify_client_error(error: hyper_util::client::legacy::Error) -> GatewayError {
    let reason = error_chain(&error);
    if error.is_connect() {
        warn!(error = %reason, "Failed to connect to backend");
        GatewayError::Connection { reason }
    } else {
        warn!(error = %reason, "Backend request failed");
        GatewayError::Request { reason }
    }
}

/// Classify a failure while reading the backend body.
///
/// Timeouts carry the bound of the clock that actually expired.
fn classify_body_error(error: BoxError) -> GatewayError {
    match body_timeout(error.as_ref()) {
        Some(expired) => {
            warn!(error = %expired, "Backend body read timed out");
            GatewayError::Timeout {
                what: expired.to_string(),
                after: expired.after(),
            }
        }
        None => GatewayError::Body {
            reason: error_chain(error.as_ref()),
        },
    }
}

/// Render an error and its sources on one line.
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
