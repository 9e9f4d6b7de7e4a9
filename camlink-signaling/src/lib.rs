//! # camlink Signaling
//!
//! The rendezvous side of camlink. A peer asks the transport for an identity,
//! opens control channels and calls toward other identities, and receives
//! everything else as [`TransportEvent`]s on a channel.
//!
//! Two implementations of [`SignalingTransport`] ship here:
//! [`LocalBroker`] endpoints for in-process use and tests, and [`WsTransport`]
//! talking to a [`RendezvousServer`] over WebSocket.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod local;
pub mod protocol;
pub mod server;
pub mod transport;

// Re-export main types
pub use client::WsTransport;
pub use local::{LocalBroker, LocalTransport};
pub use server::{Registry, RendezvousServer};
pub use transport::{EventReceiver, SignalingTransport, TransportErrorKind, TransportEvent};
