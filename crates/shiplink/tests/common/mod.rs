//! Common test utilities.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use shiplink::protocol::{PollResponse, endpoint};
use shiplink::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use shiplink::{ClientOptions, Session, ShipClient, WireEvent};

pub const SERVER: &str = "http://ship.test";
pub const COOKIE: &str = "urbauth-~zod=0vabc";

pub type Reply = Result<TransportResponse, TransportError>;

// ============================================================================
// MockTransport
// ============================================================================

/// Scripted in-memory transport.
///
/// Non-poll requests pop the next reply queued for their URL and default to
/// `200 {}`. Poll requests block until a reply is pushed with `push_poll`.
pub struct MockTransport {
    requests: Mutex<Vec<TransportRequest>>,
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    poll_tx: mpsc::UnboundedSender<Reply>,
    poll_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Reply>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            poll_tx,
            poll_rx: tokio::sync::Mutex::new(poll_rx),
        })
    }

    /// Queue a reply for the next request to `url`.
    pub fn reply(&self, url: impl Into<String>, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(url.into())
            .or_default()
            .push_back(reply);
    }

    /// Queue a raw reply for the next long poll.
    pub fn push_poll(&self, reply: Reply) {
        self.poll_tx.send(reply).unwrap();
    }

    /// Queue a poll response for the next long poll.
    pub fn push_event(&self, response: PollResponse) {
        self.push_poll(Ok(json_response(serde_json::to_value(response).unwrap())));
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<TransportRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == url)
            .collect()
    }

    /// URLs of every long poll issued so far.
    pub fn poll_urls(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains("/~/of/"))
            .map(|r| r.url)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, request: TransportRequest) -> Reply {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        if url.contains("/~/of/") {
            let mut polls = self.poll_rx.lock().await;
            return match polls.recv().await {
                Some(reply) => reply,
                None => std::future::pending().await,
            };
        }

        let queued = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&url)
            .and_then(VecDeque::pop_front);
        queued.unwrap_or_else(|| Ok(json_response(json!({}))))
    }
}

// ============================================================================
// Responses
// ============================================================================

pub fn json_response(body: Value) -> TransportResponse {
    TransportResponse {
        status: 200,
        content_type: Some("application/json".to_string()),
        set_cookie: Vec::new(),
        body: serde_json::to_vec(&body).unwrap(),
    }
}

pub fn html_response() -> TransportResponse {
    TransportResponse {
        status: 200,
        content_type: Some("text/html".to_string()),
        set_cookie: Vec::new(),
        body: b"<html>log in</html>".to_vec(),
    }
}

pub fn status_response(status: u16) -> TransportResponse {
    TransportResponse {
        status,
        content_type: Some("application/json".to_string()),
        set_cookie: Vec::new(),
        body: br#"{"fail":"nope"}"#.to_vec(),
    }
}

pub fn with_cookie(mut response: TransportResponse, header: &str) -> TransportResponse {
    response.set_cookie.push(header.to_string());
    response
}

pub fn connection_error() -> TransportError {
    TransportError::Connection("connection refused".to_string())
}

/// Bootstrap body of an authenticated `~zod` session.
pub fn zod_auth() -> Value {
    json!({"ship": "zod", "auth": ["~zod"], "oryx": "abc", "ixor": "123"})
}

// ============================================================================
// Sessions
// ============================================================================

pub fn client(transport: &Arc<MockTransport>) -> ShipClient {
    ShipClient::with_transport(transport.clone(), ClientOptions::default())
}

/// Establish a session from `body`, served with the `~zod` cookie.
pub async fn session_from(transport: &Arc<MockTransport>, body: Value) -> Session {
    transport.reply(
        endpoint::auth(SERVER),
        Ok(with_cookie(json_response(body), &format!("{COOKIE}; Path=/"))),
    );
    client(transport)
        .establish_session(SERVER, "~zod")
        .await
        .unwrap()
}

/// An authenticated `~zod` session.
pub async fn zod_session(transport: &Arc<MockTransport>) -> Session {
    session_from(transport, zod_auth()).await
}

// ============================================================================
// Waiting
// ============================================================================

pub const WAIT: Duration = Duration::from_secs(5);

pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, limit: Duration) -> T {
    tokio::time::timeout(limit, rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    recv_within(rx, WAIT).await
}

/// Receiver signalled once per heartbeat listener invocation.
pub fn beat_signals(session: &Session) -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    session.add_beat_listener(move || {
        let _ = tx.send(());
    });
    rx
}

/// Closure sink forwarding into a channel.
pub fn closure_sink() -> (
    impl Fn(&str, WireEvent) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<(String, WireEvent)>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = move |wire: &str, event: WireEvent| {
        let _ = tx.send((wire.to_string(), event));
    };
    (sink, rx)
}

/// Let spawned tasks run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
