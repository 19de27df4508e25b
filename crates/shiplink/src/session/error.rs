//! Session error types.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type for authenticated calls.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Hard failure while bootstrapping a session.
///
/// Only transport-level failures end up here; an unauthenticated or
/// redirecting server still yields a (pending) session.
#[derive(Debug, Error)]
pub enum EstablishError {
    #[error("failed to reach {server}: {source}")]
    Transport {
        server: String,
        #[source]
        source: TransportError,
    },
}

/// Why an authenticated call failed.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection, timeout, non-2xx or undecodable body.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server did not list the user as authenticated.
    #[error("server did not authenticate {user}")]
    NotAuthenticated { user: String },

    /// Well-formed response that rejected the request.
    #[error("server rejected request: {0}")]
    Rejected(String),

    /// The wire already has a subscription, or one is being opened.
    #[error("already subscribed to wire {0}")]
    AlreadySubscribed(String),

    /// The session is missing a token the call needs.
    #[error("session has no {0}")]
    MissingToken(&'static str),
}
