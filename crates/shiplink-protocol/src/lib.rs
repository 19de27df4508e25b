//! Wire types for the ship web API.
//!
//! This crate defines the JSON bodies exchanged with a ship's HTTP interface
//! and the URL layout of every endpoint. It performs no I/O.
//!
//! # Protocol Overview
//!
//! All writes are `POST` requests with a JSON body. Every authenticated write
//! carries the session's `oryx` token, and the session cookie captured at
//! bootstrap is forwarded verbatim.
//!
//! - **Auth** (`/~/auth.json`): bootstrap, authenticate (`?PUT`), deauthenticate (`?DELETE`)
//! - **Pokes** (`/~~/~/to/{app}/{mark}`): one-way commands
//! - **Subscriptions** (`/~/is/~{ship}/{app}{path}.json`): open (`?PUT`) and close (`?DELETE`)
//! - **Events** (`/~/of/{ixor}?poll={event}`): long poll for the next event
//!
//! # Example
//!
//! ```
//! use shiplink_protocol::{EventKind, PollResponse};
//!
//! let body = r#"{"beat":false,"from":{"path":"/inbox"},"type":"rush","data":{"json":{"x":1}}}"#;
//! let event: PollResponse = serde_json::from_str(body).unwrap();
//! assert!(!event.beat);
//! assert_eq!(event.kind, Some(EventKind::Rush));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mark used for every subscription opened by this client.
pub const JSON_MARK: &str = "json";

// ============================================================================
// Endpoints
// ============================================================================

/// URL builders for the remote API surface.
///
/// `server` is the base URL without a trailing slash.
pub mod endpoint {
    /// Session bootstrap and status check.
    pub fn auth(server: &str) -> String {
        format!("{server}/~/auth.json")
    }

    /// Authenticate with a login code.
    pub fn authenticate(server: &str) -> String {
        format!("{server}/~/auth.json?PUT")
    }

    /// Tear down the authenticated session.
    pub fn deauthenticate(server: &str) -> String {
        format!("{server}/~/auth.json?DELETE")
    }

    /// One-way command to `app`, tagged with a data format `mark`.
    pub fn poke(server: &str, app: &str, mark: &str) -> String {
        format!("{server}/~~/~/to/{app}/{mark}")
    }

    /// Open a subscription to `path` on `app` running on `ship`.
    pub fn subscribe(server: &str, ship: &str, app: &str, path: &str) -> String {
        format!("{server}/~/is/~{ship}/{app}{path}.json?PUT")
    }

    /// Close a subscription previously opened with [`subscribe`].
    pub fn unsubscribe(server: &str, ship: &str, app: &str, path: &str) -> String {
        format!("{server}/~/is/~{ship}/{app}{path}.json?DELETE")
    }

    /// Long poll the event channel `ixor`, starting at cursor `event`.
    pub fn poll(server: &str, ixor: &str, event: u64) -> String {
        format!("{server}/~/of/{ixor}?poll={event}")
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /~/auth.json?PUT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    /// The user logging in (e.g. `~zod`).
    pub ship: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oryx: Option<String>,
}

/// Body of `POST /~/auth.json?DELETE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeauthRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oryx: Option<String>,
}

/// Body of `POST /~~/~/to/{app}/{mark}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PokeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oryx: Option<String>,
    pub wire: String,
    /// Command payload, interpreted by the target app according to the mark.
    pub xyro: Value,
}

/// Body of both subscribe (`?PUT`) and unsubscribe (`?DELETE`) requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oryx: Option<String>,
    pub wire: String,
    pub appl: String,
    pub mark: String,
    pub ship: String,
}

impl SubscriptionRequest {
    /// Build a request body using the JSON mark.
    pub fn json(oryx: Option<String>, wire: &str, app: &str, ship: &str) -> Self {
        Self {
            oryx,
            wire: wire.to_string(),
            appl: app.to_string(),
            mark: JSON_MARK.to_string(),
            ship: ship.to_string(),
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// Body of `GET /~/auth.json` and of the authenticate response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ship: Option<String>,
    /// Users currently authenticated on this session.
    #[serde(default)]
    pub auth: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oryx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ixor: Option<String>,
    /// Redirect marker; any truthy value means the caller must log in elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red: Option<Value>,
}

impl AuthStatus {
    /// Whether the body signals a redirect instead of session details.
    pub fn is_redirect(&self) -> bool {
        match &self.red {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => true,
        }
    }

    /// Whether `user` appears in the authenticated-user list.
    pub fn lists(&self, user: &str) -> bool {
        self.auth.iter().any(|u| u == user)
    }
}

/// Body of the deauthenticate response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeauthResponse {
    #[serde(default)]
    pub ok: bool,
}

/// Kind of a non-heartbeat poll event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// New data on the wire.
    Rush,
    /// The remote closed the wire.
    Quit,
    #[serde(other)]
    Unknown,
}

/// Origin of a poll event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    /// The wire the event belongs to.
    pub path: String,
}

/// Payload of a poll event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub json: Option<Value>,
}

/// Body of `GET /~/of/{ixor}?poll={event}`.
///
/// Either a heartbeat (`{"beat": true}`) or a single event addressed to a wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub beat: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<EventSource>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<EventData>,
}

impl PollResponse {
    /// A heartbeat response.
    pub fn heartbeat() -> Self {
        Self {
            beat: true,
            ..Self::default()
        }
    }

    /// A `rush` event carrying `json` for `wire`.
    pub fn rush(wire: &str, json: Value) -> Self {
        Self {
            beat: false,
            from: Some(EventSource {
                path: wire.to_string(),
            }),
            kind: Some(EventKind::Rush),
            data: Some(EventData { json: Some(json) }),
        }
    }

    /// A `quit` event closing `wire`.
    pub fn quit(wire: &str) -> Self {
        Self {
            beat: false,
            from: Some(EventSource {
                path: wire.to_string(),
            }),
            kind: Some(EventKind::Quit),
            data: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
