//! Shiplink - client runtime for a ship's event-sourced web API.
//!
//! A [`Session`] is established with [`ShipClient::establish_session`], then
//! used to authenticate, poke apps and open subscriptions ("wires"). All
//! subscriptions share a single long-poll loop per session that advances the
//! event cursor and fans events out to each wire's [`WireSink`].

// ============================================================================
// Core Infrastructure
// ============================================================================

pub mod build_info;
pub mod config;
pub mod transport;

// ============================================================================
// Session & Components
// ============================================================================

pub mod auth;
pub mod poke;
pub mod poll;
pub mod session;
pub mod subscription;

pub use shiplink_protocol as protocol;

pub use poll::Backoff;
pub use session::{ClientError, ClientOptions, EstablishError, Session, ShipClient};
pub use subscription::{ChannelSink, WireEvent, WireSink};
pub use transport::{HttpTransport, Transport, TransportError};
