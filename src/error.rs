//! Error types for the Siftgate gateway.
//!
//! Forwarding failures are the only responses the gateway synthesizes
//! itself. Everything the backend says, including its own errors, is
//! relayed untouched and never passes through this module.

use std::time::Duration;

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Credential;

/// Error code for forwarding failures.
pub const PROXY_ERROR: &str = "proxy_error";

/// Error code for forwarding failures caused by an expired bound.
pub const PROXY_TIMEOUT: &str = "proxy_timeout";

/// Errors that can occur while forwarding a request to the backend.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Invalid or missing configuration
    #[error("Configuration error: {details}")]
    Config {
        /// What is wrong
        details: String,
    },

    /// The backend target URL could not be built
    #[error("Invalid target: {details}")]
    InvalidTarget {
        /// What is wrong
        details: String,
    },

    /// Could not establish a connection to the backend
    #[error("Connection error: {reason}")]
    Connection {
        /// Underlying failure
        reason: String,
    },

    /// The backend did not answer within the configured bound
    #[error("Timeout after {after:?}: {what}")]
    Timeout {
        /// Which phase timed out
        what: String,
        /// The bound that expired
        after: Duration,
    },

    /// Any other failure while sending the request
    #[error("Request error: {reason}")]
    Request {
        /// Underlying failure
        reason: String,
    },

    /// The backend response body could not be read
    #[error("Body error: {reason}")]
    Body {
        /// Underlying failure
        reason: String,
    },
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// JSON body of a synthesized gateway error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Stable error code (`proxy_error` or `proxy_timeout`)
    pub error: String,
    /// Stringified failure
    pub detail: String,
}

impl GatewayError {
    /// Returns `true` if this error is an expired timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }

    /// HTTP status used when this error is reported to the caller.
    pub fn status(&self) -> StatusCode {
        if self.is_timeout() {
            StatusCode::GATEWAY_TIMEOUT
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    /// Stable error code used in the JSON payload.
    pub fn code(&self) -> &'static str {
        if self.is_timeout() {
            PROXY_TIMEOUT
        } else {
            PROXY_ERROR
        }
    }

    /// Build the JSON payload, scrubbing the credential from the detail.
    pub fn to_payload(&self, credential: &Credential) -> ErrorPayload {
        ErrorPayload {
            error: self.code().to_string(),
            detail: credential.redact(&self.to_string()),
        }
    }

    /// Convert into the HTTP response sent back to the client.
    pub fn to_response(&self, credential: &Credential) -> Response {
        (self.status(), Json(self.to_payload(credential))).into_response()
    }
}
