//! Centralized configuration for the Siftgate gateway.
//!
//! Configuration is process-wide and read once at startup. Nothing in here
//! is mutated at runtime; the gateway shares it read-only across requests.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::GatewayError;

/// Header carrying the backend credential on every outbound request.
pub const CREDENTIAL_HEADER: &str = "x-api-key";

/// Default path prefix the gateway is mounted under.
pub const DEFAULT_PREFIX: &str = "/api/sift";

/// Default backend base URL.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";

/// Shared secret presented to the backend.
///
/// The value never leaves the server process: `Debug` and `Display` print a
/// redaction marker and the type is intentionally not `Serialize`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret value.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if the secret is empty or cannot be
    /// carried in an HTTP header.
    pub fn new(secret: impl Into<String>) -> Result<Self, GatewayError> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(GatewayError::Config {
                details: "SIFT_API_KEY must not be empty".to_string(),
            });
        }
        if http::HeaderValue::from_str(&secret).is_err() {
            return Err(GatewayError::Config {
                details: "SIFT_API_KEY contains characters not allowed in a header".to_string(),
            });
        }
        Ok(Self(secret))
    }

    /// Raw secret, for building the outbound header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replace every occurrence of the secret in `text`.
    pub fn redact(&self, text: &str) -> String {
        text.replace(&self.0, "[REDACTED]")
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Runtime configuration for the gateway.
///
/// All parameters except the credential have defaults and can be
/// overridden via environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Backend base URL (scheme, host, optional path prefix)
    pub backend_url: Url,

    /// Secret injected as `x-api-key`
    pub credential: Credential,

    /// Path prefix the catch-all route is mounted under
    pub prefix: String,

    /// Bound on connect + response headers. `None` waits indefinitely.
    pub upstream_timeout: Option<Duration>,

    /// TCP connect timeout for backend connections
    pub connect_timeout: Duration,

    /// Maximum wait for each chunk of the backend response body
    pub body_chunk_timeout: Duration,

    /// Maximum inbound request body size in bytes
    pub max_body_bytes: usize,

    /// Extra inbound headers that are never forwarded (lower-case)
    pub strip_headers: Vec<String>,
}

impl GatewayConfig {
    /// Build a configuration with defaults for everything but the endpoints.
    pub fn new(backend_url: Url, credential: Credential) -> Self {
        Self {
            backend_url,
            credential,
            prefix: DEFAULT_PREFIX.to_string(),
            upstream_timeout: Some(Duration::from_secs(30)),
            connect_timeout: Duration::from_secs(5),
            body_chunk_timeout: Duration::from_secs(30),
            max_body_bytes: 2 * 1024 * 1024, // 2 MB
            strip_headers: Vec::new(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SIFT_API_KEY` (required)
    /// - `BACKEND_URL` (default: `http://localhost:8080`)
    /// - `SIFTGATE_PREFIX` (default: `/api/sift`)
    /// - `SIFTGATE_UPSTREAM_TIMEOUT_SECS` (default: 30, `0` disables)
    /// - `SIFTGATE_CONNECT_TIMEOUT_SECS` (default: 5)
    /// - `SIFTGATE_BODY_CHUNK_TIMEOUT_SECS` (default: 30)
    /// - `SIFTGATE_MAX_BODY_BYTES` (default: 2097152 = 2MB)
    /// - `SIFTGATE_STRIP_HEADERS` (default: empty, comma-separated)
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` if the credential is missing or the
    /// backend URL is not an absolute http(s) URL, or the prefix is not a
    /// literal path.
    pub fn from_env() -> Result<Self, GatewayError> {
        let secret = std::env::var("SIFT_API_KEY").map_err(|_| GatewayError::Config {
            details: "SIFT_API_KEY environment variable is required".to_string(),
        })?;
        let credential = Credential::new(secret)?;

        let backend_raw =
            std::env::var("BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string());
        let backend_url = parse_backend_url(&backend_raw)?;

        let mut config = Self::new(backend_url, credential);

        if let Ok(prefix) = std::env::var("SIFTGATE_PREFIX") {
            config.prefix = normalize_prefix(&prefix)?;
        }

        config.upstream_timeout = match env_parse::<u64>("SIFTGATE_UPSTREAM_TIMEOUT_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => config.upstream_timeout,
        };

        config.connect_timeout = env_parse("SIFTGATE_CONNECT_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(config.connect_timeout);

        config.body_chunk_timeout = env_parse("SIFTGATE_BODY_CHUNK_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(config.body_chunk_timeout);

        config.max_body_bytes =
            env_parse("SIFTGATE_MAX_BODY_BYTES").unwrap_or(config.max_body_bytes);

        if let Ok(list) = std::env::var("SIFTGATE_STRIP_HEADERS") {
            config.strip_headers = parse_header_list(&list);
        }

        Ok(config)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse and validate the backend base URL.
///
/// # Errors
///
/// Returns `GatewayError::Config` for unparseable URLs, non-http(s)
/// schemes, or URLs carrying a query or fragment.
pub fn parse_backend_url(raw: &str) -> Result<Url, GatewayError> {
    let url = Url::parse(raw.trim()).map_err(|e| GatewayError::Config {
        details: format!("BACKEND_URL is not a valid URL: {}", e),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(GatewayError::Config {
            details: format!("BACKEND_URL must use http or https, got '{}'", url.scheme()),
        });
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(GatewayError::Config {
            details: "BACKEND_URL must not carry a query or fragment".to_string(),
        });
    }

    Ok(url)
}

/// Ensure the prefix starts with a single `/` and has no trailing `/`.
///
/// # Errors
///
/// Returns `GatewayError::Config` if a segment would be read as router
/// syntax (`{capture}`, `*wildcard` or `:param`). The prefix is matched
/// literally when stripping, so it must stay literal when routing too.
pub fn normalize_prefix(raw: &str) -> Result<String, GatewayError> {
    let trimmed = raw.trim().trim_matches('/');

    let literal = trimmed.split('/').all(|segment| {
        !segment.contains(['{', '}', '*']) && !segment.starts_with(':')
    });
    if !literal {
        return Err(GatewayError::Config {
            details: format!(
                "SIFTGATE_PREFIX must be a literal path, got '{}'",
                raw.trim()
            ),
        });
    }

    Ok(format!("/{}", trimmed))
}

fn parse_header_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}
