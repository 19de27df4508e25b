//! Transport error types.

use serde_json::Value;
use thiserror::Error;

/// A request that did not produce a usable 2xx response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection, TLS, timeout).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-2xx status.
    #[error("unexpected status {status}")]
    Status { status: u16, body: Option<Value> },

    /// Body could not be encoded or decoded as JSON.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure reported by a non-reqwest transport.
    #[error("connection failed: {0}")]
    Connection(String),
}

impl TransportError {
    /// Structured response body attached to a status error, if any.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }
}
