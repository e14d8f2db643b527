//! Client error types.

use std::time::Duration;

use pipeline_streaming::BoxError;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a raw response body kept in an [`ApiError`].
const MAX_BODY_LEN: usize = 1024;

/// Errors returned by the Pipeline client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The client configuration is invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The token provider failed.
    #[error("get token: {0}")]
    Token(#[source] BoxError),

    /// The request could not be performed.
    #[error("perform request: {0}")]
    Http(#[from] reqwest::Error),

    /// The request body could not be encoded.
    #[error("encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The server answered with an error response.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ClientError {
    /// Whether retrying the request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Delay requested by the server before retrying.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api(e) => e.retry_after,
            _ => None,
        }
    }

    /// The API error, if the server answered with one.
    #[must_use]
    pub const fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) => Some(e),
            _ => None,
        }
    }
}

/// Error response returned by the Pipeline API.
///
/// Displays as its title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{title}")]
pub struct ApiError {
    /// HTTP status code of the response
    #[serde(skip)]
    pub status_code: u16,

    /// Status reported in the body
    #[serde(default)]
    pub status: u16,

    /// Human-readable summary
    #[serde(default)]
    pub title: String,

    /// Detailed errors
    #[serde(default)]
    pub report: Report,

    /// Value of the `Retry-After` header
    #[serde(skip)]
    pub retry_after: Option<Duration>,
}

/// Collection of detailed errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Individual errors, in the order reported
    #[serde(default)]
    pub errors: Vec<ReportError>,
}

/// One detailed error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportError {
    /// Identifier of this occurrence
    #[serde(default)]
    pub id: String,

    /// Machine-readable error code
    #[serde(default)]
    pub code: String,

    /// Human-readable description
    #[serde(default)]
    pub message: String,
}

impl ApiError {
    /// Build an error from a response status and body.
    ///
    /// A body that is not a Pipeline error document is kept, truncated, as
    /// the title.
    #[must_use]
    pub fn from_response(status: StatusCode, body: &[u8], retry_after: Option<Duration>) -> Self {
        let mut error = serde_json::from_slice::<Self>(body).unwrap_or_else(|_| Self {
            status: status.as_u16(),
            title: raw_title(status, body),
            ..Self::default()
        });
        if error.title.is_empty() {
            error.title = raw_title(status, body);
        }
        error.status_code = status.as_u16();
        error.retry_after = retry_after;
        error
    }

    /// Whether the status suggests a transient failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        StatusCode::from_u16(self.status_code).is_ok_and(|status| {
            status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
        })
    }
}

fn raw_title(status: StatusCode, body: &[u8]) -> String {
    let body = String::from_utf8_lossy(body);
    let body = body.trim();
    if body.is_empty() {
        return status.to_string();
    }
    match body.char_indices().nth(MAX_BODY_LEN) {
        Some((cut, _)) => format!("{}…", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_from_document() {
        let body = br#"{
            "status": 403,
            "title": "Forbidden",
            "report": {"errors": [{"id": "e-1", "code": "AUTH", "message": "no access"}]}
        }"#;

        let err = ApiError::from_response(StatusCode::FORBIDDEN, body, None);

        assert_eq!(err.to_string(), "Forbidden");
        assert_eq!(err.status_code, 403);
        assert_eq!(err.status, 403);
        assert_eq!(
            err.report.errors,
            [ReportError {
                id: "e-1".into(),
                code: "AUTH".into(),
                message: "no access".into(),
            }]
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_api_error_from_raw_body() {
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, b"upstream gone\n", None);
        assert_eq!(err.title, "upstream gone");
        assert_eq!(err.status, 502);
        assert!(err.is_retryable());

        let err = ApiError::from_response(StatusCode::SERVICE_UNAVAILABLE, b"", None);
        assert_eq!(err.title, "503 Service Unavailable");
    }

    #[test]
    fn test_api_error_truncates_long_body() {
        let body = "é".repeat(MAX_BODY_LEN * 2);
        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, body.as_bytes(), None);
        assert_eq!(err.title.chars().count(), MAX_BODY_LEN + 1);
        assert!(err.title.ends_with('…'));
    }

    #[test]
    fn test_client_error_retry_hints() {
        let err = ClientError::Api(ApiError::from_response(
            StatusCode::TOO_MANY_REQUESTS,
            b"",
            Some(Duration::from_secs(3)),
        ));
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(err.api_error().map(|e| e.status_code), Some(429));

        let err = ClientError::InvalidConfig("missing group".into());
        assert!(!err.is_retryable());
        assert!(err.retry_after().is_none());
    }

    #[test]
    fn test_token_error_display() {
        let err = ClientError::Token("expired".into());
        assert_eq!(err.to_string(), "get token: expired");
    }
}
