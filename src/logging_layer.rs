//! Request logging for the gateway router.
//!
//! Built on `tower_http::trace::TraceLayer`. Every gateway call gets a span
//! carrying a request id; headers are only ever logged through
//! [`sanitize_headers`], which masks credentials.

use std::fmt;
use std::time::Duration;

use http::{HeaderMap, HeaderValue, Request, Response};
use tower_http::classify::{ServerErrorsAsFailures, ServerErrorsFailureClass, SharedClassifier};
use tower_http::trace::{
    DefaultOnBodyChunk, DefaultOnEos, MakeSpan, OnFailure, OnRequest, OnResponse, TraceLayer,
};
use tracing::{Level, Span, debug, info, warn};

use crate::config::CREDENTIAL_HEADER;

/// Header names whose values never appear in logs.
#[cfg(feature = "fuzzing")]
pub const SENSITIVE_HEADERS: &[&str] = &[
    CREDENTIAL_HEADER,
    "x-auth-token",
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
];

#[cfg(not(feature = "fuzzing"))]
const SENSITIVE_HEADERS: &[&str] = &[
    CREDENTIAL_HEADER,
    "x-auth-token",
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
];

const REDACTED: &str = "[REDACTED]";

/// Most headers rendered per map; the rest are summarized.
const MAX_LOGGED_HEADERS: usize = 50;

/// Longest header value rendered before truncation.
const MAX_LOGGED_VALUE: usize = 1024;

/// Concrete type of the gateway trace layer.
pub type GatewayTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    GatewaySpan,
    LogInbound,
    LogOutbound,
    DefaultOnBodyChunk,
    DefaultOnEos,
    LogFailure,
>;

/// Trace layer applied to the whole gateway router.
pub fn logging_layer() -> GatewayTraceLayer {
    TraceLayer::new_for_http()
        .make_span_with(GatewaySpan)
        .on_request(LogInbound)
        .on_response(LogOutbound)
        .on_failure(LogFailure)
}

/// Opens a `gateway` span per request, keyed by `x-request-id` when the
/// caller sent one and a fresh UUID v4 otherwise.
#[derive(Clone, Debug)]
pub struct GatewaySpan;

impl<B> MakeSpan<B> for GatewaySpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let request_id = match request.headers().get("x-request-id").map(HeaderValue::to_str) {
            Some(Ok(id)) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };

        tracing::info_span!(
            "gateway",
            request_id = %request_id,
            method = %request.method(),
            uri = %request.uri(),
        )
    }
}

#[derive(Clone, Debug)]
pub struct LogInbound;

impl<B> OnRequest<B> for LogInbound {
    fn on_request(&mut self, request: &Request<B>, _span: &Span) {
        info!(
            method = %request.method(),
            uri = %request.uri(),
            "Gateway call received"
        );
        if tracing::enabled!(Level::DEBUG) {
            debug!(headers = ?sanitize_headers(request.headers()), "Inbound headers");
        }
    }
}

#[derive(Clone, Debug)]
pub struct LogOutbound;

impl<B> OnResponse<B> for LogOutbound {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        info!(
            status = response.status().as_u16(),
            latency_ms = latency.as_millis(),
            "Gateway call completed"
        );
        if tracing::enabled!(Level::DEBUG) {
            debug!(headers = ?sanitize_headers(response.headers()), "Relayed headers");
        }
    }
}

/// Fires for 5xx responses, including synthesized `proxy_error`.
#[derive(Clone, Debug)]
pub struct LogFailure;

impl OnFailure<ServerErrorsFailureClass> for LogFailure {
    fn on_failure(&mut self, failure: ServerErrorsFailureClass, latency: Duration, _span: &Span) {
        warn!(
            failure = %failure,
            latency_ms = latency.as_millis(),
            "Gateway call failed"
        );
    }
}

// ============================================================================
// Header Redaction
// ============================================================================

/// `Debug` view of a header map with credentials masked.
#[cfg(feature = "fuzzing")]
pub struct SanitizedHeaders<'a>(pub &'a HeaderMap);

#[cfg(not(feature = "fuzzing"))]
struct SanitizedHeaders<'a>(&'a HeaderMap);

fn is_sensitive(name: &str, value: &HeaderValue) -> bool {
    value.is_sensitive() || SENSITIVE_HEADERS.iter().any(|s| name.eq_ignore_ascii_case(s))
}

fn render_value(value: &HeaderValue) -> String {
    match value.to_str() {
        Ok(text) if text.len() > MAX_LOGGED_VALUE => {
            // Visible ASCII only, so any byte index is a char boundary
            format!("{}... ({} bytes)", &text[..MAX_LOGGED_VALUE], text.len())
        }
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary: {} bytes>", value.len()),
    }
}

impl fmt::Debug for SanitizedHeaders<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        let total = self.0.len();

        for (name, value) in self.0.iter().take(MAX_LOGGED_HEADERS) {
            let name = name.as_str();
            if is_sensitive(name, value) {
                map.entry(&name, &REDACTED);
            } else {
                map.entry(&name, &render_value(value));
            }
        }
        if total > MAX_LOGGED_HEADERS {
            map.entry(&"...", &format!("({} more headers)", total - MAX_LOGGED_HEADERS));
        }

        map.finish()
    }
}

#[cfg(feature = "fuzzing")]
pub fn sanitize_headers(headers: &HeaderMap) -> SanitizedHeaders<'_> {
    SanitizedHeaders(headers)
}

#[cfg(not(feature = "fuzzing"))]
fn sanitize_headers(headers: &HeaderMap) -> SanitizedHeaders<'_> {
    SanitizedHeaders(headers)
}

/// Render headers for a log field, credentials masked.
pub fn redacted(headers: &HeaderMap) -> String {
    format!("{:?}", sanitize_headers(headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_are_masked() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("server-secret"));
        headers.insert("Cookie", HeaderValue::from_static("session=abc"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        let rendered = redacted(&headers);
        assert!(!rendered.contains("server-secret"));
        assert!(!rendered.contains("session=abc"));
        assert!(rendered.contains(REDACTED));
        assert!(rendered.contains("application/json"));
    }

    #[test]
    fn test_values_marked_sensitive_are_masked() {
        let mut value = HeaderValue::from_static("bearer-ish");
        value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("x-custom-token", value);

        assert!(!redacted(&headers).contains("bearer-ish"));
    }

    #[test]
    fn test_long_values_are_truncated() {
        let long = "a".repeat(2000);
        let mut headers = HeaderMap::new();
        headers.insert("x-long", HeaderValue::from_str(&long).expect("ascii"));

        let rendered = redacted(&headers);
        assert!(rendered.contains("(2000 bytes)"));
        assert!(rendered.len() < 1200);
    }

    #[test]
    fn test_binary_values_are_summarized() {
        let mut headers = HeaderMap::new();
        headers.insert("x-raw", HeaderValue::from_bytes(&[0xfa, 0xfb]).expect("opaque"));
        assert!(redacted(&headers).contains("<binary: 2 bytes>"));
    }

    #[test]
    fn test_header_count_is_bounded() {
        let mut headers = HeaderMap::new();
        for i in 0..60 {
            let name = http::HeaderName::from_bytes(format!("x-h{}", i).as_bytes())
                .expect("valid name");
            headers.insert(name, HeaderValue::from_static("v"));
        }

        assert!(redacted(&headers).contains("(10 more headers)"));
    }
}
