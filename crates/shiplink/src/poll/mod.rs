//! Long-poll loop.
//!
//! One loop per session fetches `GET /~/of/{ixor}?poll={event}` over and over,
//! fans each event out to its wire's sink and advances the cursor by one per
//! non-heartbeat response. Lifecycle:
//!
//! - `ensure_polling` starts a loop iff none is active (`subscribe` calls it)
//! - the loop goes idle by itself when a response arrives and no wire is open
//! - `stop_polling` cancels the active loop without touching subscriptions
//!
//! Transport failures, including a body that is not JSON, are retried with
//! [`Backoff`] on the same cursor, so no event is skipped. A JSON body that
//! does not fit the event shape is logged and counted like any other event.

mod backoff;

use std::sync::{Arc, Weak};

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use shiplink_protocol::{EventKind, PollResponse, endpoint};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::session::{ClientError, Session, SessionInner, SessionState, ShipClient};
use crate::subscription::{WireEvent, WireSink};
use crate::transport::TransportRequest;

pub use backoff::{Backoff, DEFAULT_BASE, DEFAULT_FACTOR, DEFAULT_MAX};

// ============================================================================
// Lifecycle
// ============================================================================

impl Session {
    /// Start the poll loop unless one is already active.
    ///
    /// Returns `true` if this call started a loop. Must be called from within
    /// a tokio runtime.
    pub fn ensure_polling(&self) -> bool {
        let cancel = {
            let mut state = self.state();
            if state.polling {
                debug!(server = %self.server(), "Already polling");
                return false;
            }
            let cancel = CancellationToken::new();
            state.polling = true;
            state.poll_cancel = Some(cancel.clone());
            self.polling_tx().send_replace(true);
            cancel
        };

        let poll_loop = PollLoop {
            session: self.downgrade(),
            cancel,
            backoff: self.options().backoff,
        };
        tokio::spawn(poll_loop.run());
        true
    }

    /// Stop the active poll loop, leaving subscriptions in place.
    ///
    /// Takes effect immediately: a response already in flight is discarded
    /// without advancing the cursor. Returns `false` if nothing was polling.
    pub fn stop_polling(&self) -> bool {
        let mut state = self.state();
        let Some(cancel) = state.poll_cancel.take() else {
            return false;
        };
        cancel.cancel();
        state.polling = false;
        self.polling_tx().send_replace(false);
        debug!(server = %self.server(), "Poll loop stop requested");
        true
    }

    /// Whether a poll loop currently owns this session.
    pub fn is_polling(&self) -> bool {
        self.state().polling
    }

    /// Wait until no poll loop is active.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.polling_tx().subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|polling| !*polling).await;
    }
}

// ============================================================================
// Loop
// ============================================================================

/// What the loop does after handling a response.
enum Step {
    Continue,
    Stop,
}

/// A resolved delivery: the sink and the event for it.
struct Delivery {
    wire: String,
    sink: Arc<dyn WireSink>,
    event: WireEvent,
}

struct PollLoop {
    session: Weak<SessionInner>,
    cancel: CancellationToken,
    backoff: Backoff,
}

impl PollLoop {
    async fn run(mut self) {
        debug!("Poll loop started");

        loop {
            // Only the client is held across the long poll, so dropping every
            // session handle is not delayed until the next response.
            let poll = match Session::upgrade(&self.session) {
                Some(session) => PollRequest::prepare(&session),
                None => {
                    debug!("Session dropped, poll loop exiting");
                    break;
                }
            };

            let outcome = match poll {
                Ok(poll) => tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break,
                    outcome = poll.send() => outcome,
                },
                Err(e) => Err(e),
            };

            let Some(session) = Session::upgrade(&self.session) else {
                debug!("Session dropped, poll loop exiting");
                break;
            };

            match outcome {
                Ok(body) => {
                    self.backoff.reset();
                    if let Step::Stop = session.handle_poll_body(&self.cancel, body) {
                        break;
                    }
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    error!(
                        event = session.event(),
                        attempt = self.backoff.attempt(),
                        retry_in_secs = delay.as_secs_f64(),
                        error = %e,
                        "Poll failed"
                    );
                    drop(session);

                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        debug!("Poll loop stopped");
    }
}

/// One long poll at the current cursor, detached from the session.
struct PollRequest {
    client: ShipClient,
    request: TransportRequest,
}

impl PollRequest {
    fn prepare(session: &Session) -> Result<Self, ClientError> {
        let (ixor, event, cookie) = {
            let state = session.state();
            (state.ixor.clone(), state.event, state.cookie.clone())
        };
        let ixor = ixor.ok_or(ClientError::MissingToken("event channel (ixor)"))?;

        let request = TransportRequest::get(endpoint::poll(session.server(), &ixor, event))
            .with_cookie(cookie);
        Ok(Self {
            client: session.client().clone(),
            request,
        })
    }

    /// A body that is not JSON at all counts as a failed poll.
    async fn send(self) -> Result<Value, ClientError> {
        let response = self.client.send(self.request).await?;
        Ok(response.json()?)
    }
}

/// A poll body, decoded as far as its shape allows.
enum Polled {
    Response(PollResponse),
    /// Valid JSON that is not a poll response.
    Malformed {
        beat: bool,
        error: serde_json::Error,
    },
}

impl Polled {
    fn decode(body: &Value) -> Self {
        match PollResponse::deserialize(body) {
            Ok(response) => Self::Response(response),
            Err(error) => Self::Malformed {
                beat: body.get("beat") == Some(&Value::Bool(true)),
                error,
            },
        }
    }

    fn is_beat(&self) -> bool {
        match self {
            Self::Response(response) => response.beat,
            Self::Malformed { beat, .. } => *beat,
        }
    }
}

impl Session {
    /// Apply one poll body to the session and dispatch it.
    ///
    /// Every non-heartbeat body advances the cursor, including ones that
    /// cannot be delivered, so the server never hands back the same event.
    fn handle_poll_body(&self, cancel: &CancellationToken, body: Value) -> Step {
        let polled = Polled::decode(&body);
        let (listeners, delivery) = {
            let mut state = self.state();

            // Checked under the lock that `stop_polling` takes, so a stopped
            // loop never touches the cursor.
            if cancel.is_cancelled() {
                return Step::Stop;
            }

            if state.subscriptions.is_empty() {
                state.polling = false;
                state.poll_cancel = None;
                self.polling_tx().send_replace(false);
                debug!(server = %self.server(), "No open wires, poll loop going idle");
                return Step::Stop;
            }

            state.last_update = Utc::now();
            let listeners = state.beat_listeners.clone();

            let delivery = if polled.is_beat() {
                None
            } else {
                let delivery = match polled {
                    Polled::Response(response) => resolve_delivery(&state, response),
                    Polled::Malformed { error, .. } => {
                        warn!(event = state.event, %error, %body, "Malformed event, skipping");
                        None
                    }
                };
                state.event += 1;
                delivery
            };

            (listeners, delivery)
        };

        for listener in &listeners {
            listener();
        }

        if let Some(Delivery { wire, sink, event }) = delivery {
            sink.deliver(&wire, event);
        }

        Step::Continue
    }
}

/// Find the sink for a non-heartbeat event.
///
/// The event's `from.path` is matched against open wires verbatim, then with
/// one leading `/` removed. Events that cannot be delivered are logged.
fn resolve_delivery(state: &SessionState, response: PollResponse) -> Option<Delivery> {
    let Some(from) = response.from else {
        warn!(event = state.event, "Event without source wire, skipping");
        return None;
    };

    let found = state.subscriptions.get_key_value(from.path.as_str()).or_else(|| {
        from.path
            .strip_prefix('/')
            .and_then(|wire| state.subscriptions.get_key_value(wire))
    });
    let Some((wire, subscription)) = found else {
        error!(wire = %from.path, event = state.event, "No callback for wire");
        return None;
    };

    let event = match response.kind {
        Some(EventKind::Rush) => {
            WireEvent::Rush(response.data.and_then(|d| d.json).unwrap_or(Value::Null))
        }
        Some(EventKind::Quit) => WireEvent::Quit,
        Some(EventKind::Unknown) | None => {
            warn!(wire = %wire, event = state.event, "Event of unknown type, skipping");
            return None;
        }
    };

    Some(Delivery {
        wire: wire.clone(),
        sink: Arc::clone(&subscription.sink),
        event,
    })
}
