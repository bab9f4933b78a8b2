//! Client invocation library for the gateway.
//!
//! Every call is resolved relative to the gateway prefix URL. There is no
//! way to address the backend directly from here, and no retry, caching or
//! ordering between concurrent calls.

pub mod api;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub use api::SiftApi;

/// Errors returned by the client library.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// Non-success status. The message is the raw response body.
    #[error("{body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Raw response body, unmodified
        body: String,
    },

    /// The request never produced a response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A success response could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The call path would leave the gateway prefix
    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl InvocationError {
    /// HTTP status for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            InvocationError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Decoded success body of a `get`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Response declared `application/json`
    Json(Value),
    /// Anything else, as text
    Text(String),
}

impl Payload {
    /// Decode into `T`. Text payloads are parsed as JSON as a fallback.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, InvocationError> {
        match self {
            Payload::Json(value) => Ok(serde_json::from_value(value)?),
            Payload::Text(text) => Ok(serde_json::from_str(&text)?),
        }
    }
}

/// Thin JSON client bound to the gateway prefix.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base: Url,
}

impl GatewayClient {
    /// Create a client for the gateway mounted at `gateway_base`,
    /// e.g. `http://localhost:3000/api/sift`.
    ///
    /// # Errors
    ///
    /// Returns `InvocationError::InvalidPath` if the base is not an
    /// absolute http(s) URL.
    pub fn new(gateway_base: &str) -> Result<Self, InvocationError> {
        Self::with_client(reqwest::Client::new(), gateway_base)
    }

    /// Same as [`GatewayClient::new`] with a caller-configured client.
    ///
    /// # Errors
    ///
    /// Returns `InvocationError::InvalidPath` for an unusable base URL.
    pub fn with_client(http: reqwest::Client, gateway_base: &str) -> Result<Self, InvocationError> {
        let mut base = Url::parse(gateway_base)
            .map_err(|e| InvocationError::InvalidPath(format!("{}: {}", gateway_base, e)))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(InvocationError::InvalidPath(format!(
                "gateway base must be http(s): {}",
                gateway_base
            )));
        }
        base.set_query(None);
        base.set_fragment(None);
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { http, base })
    }

    /// Gateway prefix URL every call is resolved against.
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a call path (e.g. `mode?email=a%40b.c`) under the prefix.
    ///
    /// # Errors
    ///
    /// Rejects absolute URLs, protocol-relative paths and `..` segments.
    pub fn resolve(&self, path: &str) -> Result<Url, InvocationError> {
        let invalid = || InvocationError::InvalidPath(path.to_string());

        let path_part = path.split(['?', '#']).next().unwrap_or_default();
        if path.starts_with("//")
            || path_part.contains(':')
            || path_part.contains('\\')
            || path_part.split('/').any(|segment| segment == ".." || segment == ".")
        {
            return Err(invalid());
        }

        let url = self
            .base
            .join(path.trim_start_matches('/'))
            .map_err(|_| invalid())?;

        // Last line of defence: the result must stay under the prefix.
        let same_origin = url.origin() == self.base.origin();
        if !same_origin || !url.path().starts_with(self.base.path()) {
            return Err(invalid());
        }
        Ok(url)
    }

    /// Read request.
    ///
    /// Returns JSON when the response declares `application/json`, text
    /// otherwise.
    ///
    /// # Errors
    ///
    /// `InvocationError::Status` with the raw body on non-success status.
    pub async fn get(&self, path: &str) -> Result<Payload, InvocationError> {
        let url = self.resolve(path)?;
        debug!(url = %url, "GET via gateway");

        let response = self.http.get(url).send().await?;
        let response = ensure_success(response).await?;

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        let text = response.text().await?;
        if is_json {
            Ok(Payload::Json(serde_json::from_str(&text)?))
        } else {
            Ok(Payload::Text(text))
        }
    }

    /// `get` decoded into `T`.
    ///
    /// # Errors
    ///
    /// As [`GatewayClient::get`], plus `Decode` if the shape does not match.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, InvocationError> {
        self.get(path).await?.into_json()
    }

    /// Mutating request with a JSON body.
    ///
    /// A payload serializing to `null` is sent as `{}`. The response is
    /// always parsed as JSON.
    ///
    /// # Errors
    ///
    /// `InvocationError::Status` with the raw body on non-success status.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &B,
    ) -> Result<Value, InvocationError> {
        let url = self.resolve(path)?;
        let body = match serde_json::to_value(payload)? {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        debug!(url = %url, "POST via gateway");

        let response = self
            .http
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(serde_json::to_vec(&body)?)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// `post` decoded into `T`.
    ///
    /// # Errors
    ///
    /// As [`GatewayClient::post`], plus `Decode` if the shape does not match.
    pub async fn post_json<B, T>(&self, path: &str, payload: &B) -> Result<T, InvocationError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        Ok(serde_json::from_value(self.post(path, payload).await?)?)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, InvocationError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await?;
    debug!(status = status.as_u16(), "Gateway call failed");
    Err(InvocationError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Form-encode query pairs (`email=a%40b.c&limit=200`).
pub fn query(pairs: &[(&str, &str)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> GatewayClient {
        GatewayClient::new("http://localhost:3000/api/sift").expect("client")
    }

    #[test]
    fn test_base_gets_trailing_slash() {
        assert_eq!(client().base().as_str(), "http://localhost:3000/api/sift/");
    }

    #[test]
    fn test_resolve_under_prefix() {
        let url = client().resolve("mode?email=a%40b.c").expect("url");
        assert_eq!(url.as_str(), "http://localhost:3000/api/sift/mode?email=a%40b.c");

        let url = client().resolve("/gmail/batch-classify").expect("url");
        assert_eq!(url.as_str(), "http://localhost:3000/api/sift/gmail/batch-classify");
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let client = client();
        for path in [
            "http://backend:8080/mode",
            "//backend:8080/mode",
            "../../mode",
            "rules/../../admin",
            "./mode",
            "a\\..\\b",
        ] {
            assert!(
                matches!(client.resolve(path), Err(InvocationError::InvalidPath(_))),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_allows_colon_in_query() {
        let url = client().resolve("audit?email=a%40b.c&since=10:00").expect("url");
        assert!(url.as_str().ends_with("audit?email=a%40b.c&since=10:00"));
    }

    #[test]
    fn test_invalid_base() {
        assert!(GatewayClient::new("not a url").is_err());
        assert!(GatewayClient::new("ftp://host/api").is_err());
    }

    #[test]
    fn test_status_error_message_is_raw_body() {
        let err = InvocationError::Status {
            status: 404,
            body: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "not found");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_payload_into_json_from_text() {
        let payload = Payload::Text(r#"{"shadow":true}"#.to_string());
        let value: Value = payload.into_json().expect("json");
        assert_eq!(value, json!({"shadow": true}));
    }

    #[test]
    fn test_query_encoding() {
        assert_eq!(
            query(&[("email", "ops+1@example.com"), ("limit", "200")]),
            "email=ops%2B1%40example.com&limit=200"
        );
    }
}
