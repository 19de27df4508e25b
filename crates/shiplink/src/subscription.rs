//! Subscription registry.
//!
//! Each open wire maps to the remote path it watches and the [`WireSink`] its
//! events are delivered to. Wires are unique per session: a second subscribe
//! on a wire that is open, or still being opened, is rejected.

use std::sync::Arc;

use serde_json::Value;
use shiplink_protocol::{SubscriptionRequest, endpoint};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::auth::log_error_body;
use crate::session::{ClientError, Result, Session};

// ============================================================================
// Events & Sinks
// ============================================================================

/// An event delivered to a wire.
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    /// New data from the remote app.
    Rush(Value),
    /// The remote closed the wire. The registry entry stays until
    /// `unsubscribe` is called.
    Quit,
}

impl WireEvent {
    /// Payload as JSON, `None` for [`WireEvent::Quit`].
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Rush(json) => Some(json),
            Self::Quit => None,
        }
    }
}

/// Dispatch target for one wire's events.
///
/// Called from the poll loop task, outside any session lock, so a sink may
/// call back into the session (e.g. to unsubscribe on [`WireEvent::Quit`]).
pub trait WireSink: Send + Sync + 'static {
    fn deliver(&self, wire: &str, event: WireEvent);
}

impl<F> WireSink for F
where
    F: Fn(&str, WireEvent) + Send + Sync + 'static,
{
    fn deliver(&self, wire: &str, event: WireEvent) {
        self(wire, event)
    }
}

/// Sink forwarding `(wire, event)` pairs into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<(String, WireEvent)>,
}

impl ChannelSink {
    /// Create a sink and the receiver its events arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(String, WireEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl WireSink for ChannelSink {
    fn deliver(&self, wire: &str, event: WireEvent) {
        if self.tx.send((wire.to_string(), event)).is_err() {
            debug!(wire, "Event receiver dropped");
        }
    }
}

/// One open wire.
pub(crate) struct Subscription {
    pub(crate) path: String,
    pub(crate) sink: Arc<dyn WireSink>,
}

// ============================================================================
// Registry Operations
// ============================================================================

impl Session {
    /// Subscribe `wire` to `path` on `app` running on `ship`.
    ///
    /// On success the wire is registered and the poll loop is started if none
    /// is running. Returns `false` if the wire is already taken or the request
    /// fails; the registry is unchanged in both cases.
    pub async fn subscribe<S: WireSink>(
        &self,
        ship: &str,
        wire: &str,
        app: &str,
        path: &str,
        sink: S,
    ) -> bool {
        match self.try_subscribe(ship, wire, app, path, Arc::new(sink)).await {
            Ok(()) => {
                debug!(wire, app, path, "Subscribed successfully");
                true
            }
            Err(e) => {
                error!(wire, app, path, error = %e, "Subscribe failed");
                log_error_body(&e);
                false
            }
        }
    }

    async fn try_subscribe(
        &self,
        ship: &str,
        wire: &str,
        app: &str,
        path: &str,
        sink: Arc<dyn WireSink>,
    ) -> Result<()> {
        let _reservation = WireReservation::acquire(self, wire)?;

        let body = SubscriptionRequest::json(self.oryx(), wire, app, ship);
        let request = self.command(
            endpoint::subscribe(self.server(), ship, app, path),
            &body,
            self.options().subscribe_timeout,
        )?;
        self.send(request).await?;

        self.state().subscriptions.insert(
            wire.to_string(),
            Subscription {
                path: path.to_string(),
                sink,
            },
        );
        self.ensure_polling();
        Ok(())
    }

    /// Close `wire`. Succeeds without contacting the server if the wire is
    /// not open.
    ///
    /// The entry is removed once the server acknowledges; the poll loop
    /// notices an empty registry on its next response and goes idle.
    pub async fn unsubscribe(&self, ship: &str, wire: &str, app: &str) -> bool {
        match self.try_unsubscribe(ship, wire, app).await {
            Ok(true) => {
                debug!(wire, app, "Unsubscribed successfully");
                true
            }
            Ok(false) => {
                debug!(wire, "Not subscribed to wire");
                true
            }
            Err(e) => {
                error!(wire, app, error = %e, "Unsubscribe failed");
                log_error_body(&e);
                false
            }
        }
    }

    /// Returns whether a subscription was actually closed.
    async fn try_unsubscribe(&self, ship: &str, wire: &str, app: &str) -> Result<bool> {
        let path = self.state().subscriptions.get(wire).map(|s| s.path.clone());
        let Some(path) = path else {
            return Ok(false);
        };

        let body = SubscriptionRequest::json(self.oryx(), wire, app, ship);
        let request = self.command(
            endpoint::unsubscribe(self.server(), ship, app, &path),
            &body,
            self.options().request_timeout,
        )?;
        self.send(request).await?;

        self.state().subscriptions.remove(wire);
        Ok(true)
    }
}

/// Marks a wire as being opened; released on drop, including when the
/// subscribe future is cancelled mid-request.
struct WireReservation<'a> {
    session: &'a Session,
    wire: &'a str,
}

impl<'a> WireReservation<'a> {
    fn acquire(session: &'a Session, wire: &'a str) -> Result<Self> {
        let mut state = session.state();
        if state.subscriptions.contains_key(wire) || !state.pending_wires.insert(wire.to_string()) {
            return Err(ClientError::AlreadySubscribed(wire.to_string()));
        }
        Ok(Self { session, wire })
    }
}

impl Drop for WireReservation<'_> {
    fn drop(&mut self) {
        self.session.state().pending_wires.remove(self.wire);
    }
}
