//! Transport adapter contract.
//!
//! The session core never talks HTTP directly. It builds [`TransportRequest`]s
//! and hands them to a [`Transport`], which returns the status, the two
//! headers the core reads (`content-type`, `set-cookie`) and the raw body.
//! [`HttpTransport`] is the reqwest-backed implementation used in production.

mod error;
mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use error::TransportError;
pub use http::HttpTransport;

/// HTTP methods used by the remote API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// JSON body, sent with `content-type: application/json`.
    pub body: Option<Value>,
    /// Value of the `Cookie` request header.
    pub cookie: Option<String>,
    /// Per-call timeout. `None` waits indefinitely (long poll).
    pub timeout: Option<Duration>,
}

impl TransportRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            body: None,
            cookie: None,
            timeout: None,
        }
    }

    /// Build a `POST` carrying `body` serialized as JSON.
    pub fn post_json<T: Serialize>(url: impl Into<String>, body: &T) -> Result<Self, TransportError> {
        Ok(Self {
            method: Method::Post,
            url: url.into(),
            body: Some(serde_json::to_value(body)?),
            cookie: None,
            timeout: None,
        })
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: Option<String>) -> Self {
        self.cookie = cookie;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What the core needs to know about a response.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// Every `set-cookie` header value, in the order received.
    pub set_cookie: Vec<String>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the media type is `application/json`, ignoring parameters.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Session cookie: the first `set-cookie` value up to its first `;`.
    pub fn session_cookie(&self) -> Option<String> {
        let header = self.set_cookie.first()?;
        let cookie = header.split(';').next().unwrap_or_default().trim();
        (!cookie.is_empty()).then(|| cookie.to_string())
    }

    /// Turn a non-2xx response into [`TransportError::Status`].
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(TransportError::Status {
                status: self.status,
                body: serde_json::from_slice(&self.body).ok(),
            })
        }
    }
}

/// Performs HTTP exchanges on behalf of a session.
///
/// Implementations only move bytes: status checking, cookie capture and JSON
/// interpretation are done by the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(status: u16, content_type: Option<&str>) -> TransportResponse {
        TransportResponse {
            status,
            content_type: content_type.map(str::to_string),
            ..TransportResponse::default()
        }
    }

    #[test]
    fn test_session_cookie_takes_first_header_up_to_semicolon() {
        let resp = TransportResponse {
            set_cookie: vec![
                "urbauth-~zod=0vabc; Path=/; Max-Age=604800".to_string(),
                "other=1; Path=/".to_string(),
            ],
            ..response(200, None)
        };
        assert_eq!(resp.session_cookie().as_deref(), Some("urbauth-~zod=0vabc"));
    }

    #[test]
    fn test_session_cookie_absent() {
        assert_eq!(response(200, None).session_cookie(), None);
    }

    #[test]
    fn test_json_detection_ignores_parameters() {
        assert!(response(200, Some("application/json")).is_json());
        assert!(response(200, Some("application/json; charset=utf-8")).is_json());
        assert!(!response(200, Some("text/html")).is_json());
        assert!(!response(200, None).is_json());
    }

    #[test]
    fn test_error_for_status_keeps_structured_body() {
        let resp = TransportResponse {
            body: br#"{"fail":"no"}"#.to_vec(),
            ..response(500, Some("application/json"))
        };
        match resp.error_for_status() {
            Err(TransportError::Status { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, Some(json!({"fail": "no"})));
            }
            other => panic!("expected status error, got {other:?}"),
        }

        assert!(response(204, None).error_for_status().is_ok());
    }

    #[test]
    fn test_post_json_serializes_body() {
        let req = TransportRequest::post_json("http://x/y", &json!({"oryx": "abc"}))
            .unwrap()
            .with_cookie(Some("c=1".to_string()))
            .with_timeout(Duration::from_secs(30));

        assert_eq!(req.method, Method::Post);
        assert_eq!(req.body, Some(json!({"oryx": "abc"})));
        assert_eq!(req.cookie.as_deref(), Some("c=1"));
        assert_eq!(req.timeout, Some(Duration::from_secs(30)));
    }
}
