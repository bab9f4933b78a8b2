//! Forwarding model: how an inbound gateway request becomes a backend request.
//!
//! Everything in here is pure. The network side lives in `proxy_service`.
//!
//! # Rules
//!
//! - Target: `{backend}/{segments joined by "/"}` plus the inbound raw query,
//!   byte-for-byte, when one was present.
//! - Headers: copy inbound, drop `host`, `accept-encoding` and hop-by-hop
//!   headers, overwrite `x-api-key` with the server-held credential, default
//!   `content-type` to `application/json`.
//! - Body: never sent for GET/HEAD. Otherwise the received bytes are
//!   forwarded verbatim and an absent body becomes `{}`.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::header::{ACCEPT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use url::Url;

use crate::config::{CREDENTIAL_HEADER, Credential, GatewayConfig};
use crate::error::{GatewayError, GatewayResult};

/// Connection-scoped headers that must not be relayed to the backend.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Body of an inbound request, classified for forwarding.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundBody {
    /// No body, or a zero-length one
    Absent,
    /// Raw bytes as received, already serialized by the caller
    Raw(Bytes),
}

impl InboundBody {
    /// Classify raw bytes read off the wire.
    pub fn from_bytes(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            InboundBody::Absent
        } else {
            InboundBody::Raw(bytes)
        }
    }

    /// Resolve the outbound body for `method`.
    ///
    /// Returns `None` for GET and HEAD regardless of content.
    pub fn into_forwarded(self, method: &Method) -> Option<Bytes> {
        if method_forbids_body(method) {
            return None;
        }
        Some(match self {
            InboundBody::Absent => Bytes::from_static(b"{}"),
            InboundBody::Raw(bytes) => bytes,
        })
    }
}

/// GET and HEAD never carry a body to the backend.
pub fn method_forbids_body(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

/// A fully resolved request ready to be sent to the backend.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    /// Inbound method, unchanged
    pub method: Method,
    /// Absolute backend URI
    pub target: Uri,
    /// Outbound headers, credential injected
    pub headers: HeaderMap,
    /// Outbound body; always `None` for GET/HEAD
    pub body: Option<Bytes>,
}

impl ForwardRequest {
    /// Build the outbound request for an inbound gateway call.
    ///
    /// `uri` is the inbound request URI, gateway prefix included.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidTarget` if the backend URI cannot be
    /// assembled.
    pub fn from_inbound(
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: InboundBody,
        config: &GatewayConfig,
    ) -> GatewayResult<Self> {
        let remainder = strip_prefix(uri.path(), &config.prefix);
        let segments = split_segments(remainder);
        let target = build_target_url(&config.backend_url, &segments, uri.query())?;
        let headers = build_outbound_headers(headers, &config.credential, &config.strip_headers);
        let body = body.into_forwarded(&method);

        Ok(Self {
            method,
            target,
            headers,
            body,
        })
    }
}

/// Response relayed back to the client.
#[derive(Debug, Clone)]
pub struct ForwardResponse {
    /// Backend status code, verbatim
    pub status: StatusCode,
    /// Backend `content-type`, if any
    pub content_type: Option<HeaderValue>,
    /// Backend body, verbatim
    pub body: Bytes,
}

impl IntoResponse for ForwardResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        if let Some(content_type) = self.content_type {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        response
    }
}

/// Strip the gateway prefix from an inbound path.
///
/// A path that does not start with the prefix is returned whole; the router
/// only dispatches prefixed paths here.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> &'a str {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
        _ => path,
    }
}

/// Split a raw path into its non-empty segments, keeping percent-encoding.
pub fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join the backend base URL, the path segments and the raw query.
///
/// The query string is appended exactly as received: no decoding,
/// re-encoding or reordering.
///
/// # Errors
///
/// Returns `GatewayError::InvalidTarget` if the result is not a valid URI.
pub fn build_target_url(
    base: &Url,
    segments: &[String],
    query: Option<&str>,
) -> GatewayResult<Uri> {
    let mut target = String::with_capacity(base.as_str().len() + 64);
    target.push_str(base.as_str().trim_end_matches('/'));
    target.push('/');
    target.push_str(&segments.join("/"));
    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }

    target.parse::<Uri>().map_err(|e| GatewayError::InvalidTarget {
        details: format!("cannot build backend URI: {}", e),
    })
}

/// Build outbound headers from inbound ones.
///
/// Inbound headers are copied except `host`, hop-by-hop headers,
/// `content-length` (recomputed from the forwarded body), anything listed
/// in `strip`, and any client-supplied credential header.
///
/// `accept-encoding` is dropped too: only `content-type` is relayed back, so
/// the backend must answer with an identity-encoded body.
pub fn build_outbound_headers(
    inbound: &HeaderMap,
    credential: &Credential,
    strip: &[String],
) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len() + 2);

    for (name, value) in inbound {
        if is_excluded(name, strip) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }

    // Credential was validated as a header value at construction.
    if let Ok(mut value) = HeaderValue::from_str(credential.expose()) {
        value.set_sensitive(true);
        outbound.insert(HeaderName::from_static(CREDENTIAL_HEADER), value);
    }

    if !outbound.contains_key(CONTENT_TYPE) {
        outbound.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }

    outbound
}

fn is_excluded(name: &HeaderName, strip: &[String]) -> bool {
    let name = name.as_str();
    name == HOST.as_str()
        || name == CONTENT_LENGTH.as_str()
        || name == ACCEPT_ENCODING.as_str()
        || name == CREDENTIAL_HEADER
        || HOP_BY_HOP_HEADERS.contains(&name)
        || strip.iter().any(|s| s.eq_ignore_ascii_case(name))
}
