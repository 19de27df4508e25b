//! Session state shared by the auth, poke, subscription and poll components.
//!
//! A [`Session`] is a cheap-to-clone handle around one connection to a ship.
//! Its mutable fields live in a single `SessionState` behind a mutex that is
//! never held across an `.await`, so every read-modify-write of the event
//! cursor, the tokens, the subscription table and the polling flag is
//! serialized with respect to the other components.

mod error;

use std::collections::{HashMap, HashSet};
use std::fmt;
// std::sync::Mutex: the state lock is never held across .await points.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::poll::Backoff;
use crate::subscription::Subscription;
use crate::transport::{
    HttpTransport, Transport, TransportError, TransportRequest, TransportResponse,
};

pub use error::{ClientError, EstablishError, Result};

/// Default timeout for every call except subscribe and the long poll.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Default subscribe timeout. Subscribing hangs when the app is not listening.
pub const DEFAULT_SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ShipClient
// ============================================================================

/// Tunables shared by every session created from one [`ShipClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub request_timeout: Duration,
    pub subscribe_timeout: Duration,
    /// Retry policy of the poll loop. Copied fresh into each loop.
    pub backoff: Backoff,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            subscribe_timeout: DEFAULT_SUBSCRIBE_TIMEOUT,
            backoff: Backoff::default(),
        }
    }
}

/// Entry point: a transport plus options, used to establish sessions.
#[derive(Clone)]
pub struct ShipClient {
    transport: Arc<dyn Transport>,
    options: ClientOptions,
}

impl ShipClient {
    /// Create a client speaking HTTP through reqwest.
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        Self::with_transport(Arc::new(HttpTransport::new()), options)
    }

    /// Create a client over a custom transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, options: ClientOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Send a request, treating any non-2xx status as a transport failure.
    pub(crate) async fn send(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.transport.request(request).await?.error_for_status()
    }
}

impl fmt::Debug for ShipClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShipClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Session State
// ============================================================================

pub(crate) type BeatListener = Arc<dyn Fn() + Send + Sync>;

/// Mutable fields of a session.
pub(crate) struct SessionState {
    pub(crate) ship: Option<String>,
    pub(crate) authenticated: bool,
    /// Anti-replay token sent with every authenticated write.
    pub(crate) oryx: Option<String>,
    /// Event channel identifier.
    pub(crate) ixor: Option<String>,
    pub(crate) cookie: Option<String>,
    /// Next event to request. Starts at 1, never decreases.
    pub(crate) event: u64,
    /// True iff a poll loop owns this session.
    pub(crate) polling: bool,
    /// Stop token of the active poll loop.
    pub(crate) poll_cancel: Option<CancellationToken>,
    pub(crate) subscriptions: HashMap<String, Subscription>,
    /// Wires with a subscribe request in flight.
    pub(crate) pending_wires: HashSet<String>,
    pub(crate) last_update: DateTime<Utc>,
    pub(crate) beat_listeners: Vec<BeatListener>,
}

impl SessionState {
    pub(crate) fn new(cookie: Option<String>) -> Self {
        Self {
            ship: None,
            authenticated: false,
            oryx: None,
            ixor: None,
            cookie,
            event: 1,
            polling: false,
            poll_cancel: None,
            subscriptions: HashMap::new(),
            pending_wires: HashSet::new(),
            last_update: Utc::now(),
            beat_listeners: Vec::new(),
        }
    }
}

pub(crate) struct SessionInner {
    client: ShipClient,
    server: String,
    user: String,
    state: Mutex<SessionState>,
    /// Mirrors `SessionState::polling` for waiters.
    polling_tx: watch::Sender<bool>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(cancel) = state.poll_cancel.take() {
            cancel.cancel();
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// Handle to one authenticated (or pending) connection to a ship.
///
/// Clones share the same state. The poll loop holds only a weak reference;
/// dropping every handle cancels it, including a long poll in flight.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(client: ShipClient, server: &str, user: &str, state: SessionState) -> Self {
        let (polling_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(SessionInner {
                client,
                server: server.to_string(),
                user: user.to_string(),
                state: Mutex::new(state),
                polling_tx,
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<SessionInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    /// Base URL of the ship, without a trailing slash.
    pub fn server(&self) -> &str {
        &self.inner.server
    }

    /// The local user this session authenticates as.
    pub fn user(&self) -> &str {
        &self.inner.user
    }

    /// Ship name reported by the server, if the bootstrap returned one.
    pub fn ship(&self) -> Option<String> {
        self.state().ship.clone()
    }

    // ------------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------------

    /// Cached authentication flag. See `check_authenticated` for a live check.
    pub fn is_authenticated(&self) -> bool {
        self.state().authenticated
    }

    /// Current event cursor.
    pub fn event(&self) -> u64 {
        self.state().event
    }

    pub fn oryx(&self) -> Option<String> {
        self.state().oryx.clone()
    }

    pub fn ixor(&self) -> Option<String> {
        self.state().ixor.clone()
    }

    pub fn cookie(&self) -> Option<String> {
        self.state().cookie.clone()
    }

    /// Time of the last successful authentication or poll response.
    pub fn last_update(&self) -> DateTime<Utc> {
        self.state().last_update
    }

    /// Open wires, sorted.
    pub fn wires(&self) -> Vec<String> {
        let mut wires: Vec<String> = self.state().subscriptions.keys().cloned().collect();
        wires.sort();
        wires
    }

    pub fn is_subscribed(&self, wire: &str) -> bool {
        self.state().subscriptions.contains_key(wire)
    }

    /// Register a listener fired on every poll response, heartbeat or not.
    pub fn add_beat_listener<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.state().beat_listeners.push(Arc::new(listener));
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn client(&self) -> &ShipClient {
        &self.inner.client
    }

    pub(crate) fn options(&self) -> &ClientOptions {
        &self.inner.client.options
    }

    pub(crate) fn polling_tx(&self) -> &watch::Sender<bool> {
        &self.inner.polling_tx
    }

    /// Build an authenticated `POST` carrying the session cookie.
    pub(crate) fn command<T: Serialize>(
        &self,
        url: String,
        body: &T,
        timeout: Duration,
    ) -> std::result::Result<TransportRequest, TransportError> {
        let cookie = self.cookie();
        Ok(TransportRequest::post_json(url, body)?
            .with_cookie(cookie)
            .with_timeout(timeout))
    }

    pub(crate) async fn send(
        &self,
        request: TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        self.client().send(request).await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Session")
            .field("server", &self.inner.server)
            .field("user", &self.inner.user)
            .field("ship", &state.ship)
            .field("authenticated", &state.authenticated)
            .field("event", &state.event)
            .field("polling", &state.polling)
            .field("wires", &state.subscriptions.len())
            .finish_non_exhaustive()
    }
}
