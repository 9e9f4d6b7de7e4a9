//! Signaling transport boundary
//!
//! Commands go out through [`SignalingTransport`]; everything the transport
//! has to say comes back later as a [`TransportEvent`]. Events for one
//! resource (a single call, a single channel) arrive in the order the
//! transport produced them. Nothing is promised across resources.

use camlink_core::{CallId, ChannelId, CamlinkError, PeerId};
use camlink_media::MediaStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Receiving half for transport events
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Classified transport failure
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransportErrorKind {
    /// Target identity was never registered or is offline
    PeerUnavailable,
    /// The rendezvous service could not be reached
    Network,
    /// The client lacks a capability the transport needs
    BrowserIncompatible,
    /// Anything else; keeps the raw code for diagnostics
    Unknown(String),
}

impl TransportErrorKind {
    /// Parse a wire code
    pub fn from_code(code: &str) -> Self {
        match code {
            "peer-unavailable" => TransportErrorKind::PeerUnavailable,
            "network" => TransportErrorKind::Network,
            "browser-incompatible" => TransportErrorKind::BrowserIncompatible,
            other => TransportErrorKind::Unknown(other.to_string()),
        }
    }

    /// Wire code
    pub fn code(&self) -> &str {
        match self {
            TransportErrorKind::PeerUnavailable => "peer-unavailable",
            TransportErrorKind::Network => "network",
            TransportErrorKind::BrowserIncompatible => "browser-incompatible",
            TransportErrorKind::Unknown(code) => code,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<String> for TransportErrorKind {
    fn from(code: String) -> Self {
        Self::from_code(&code)
    }
}

impl From<TransportErrorKind> for String {
    fn from(kind: TransportErrorKind) -> Self {
        kind.code().to_string()
    }
}

/// Notifications delivered by a transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Identity assigned
    Open {
        /// The new identity
        id: PeerId,
    },
    /// Peer-level failure
    Error {
        /// Classified kind
        kind: TransportErrorKind,
        /// Transport supplied detail
        message: String,
    },
    /// Another peer opened a control channel to us
    IncomingChannel {
        /// Channel handle
        channel: ChannelId,
        /// Peer on the other end
        peer: PeerId,
    },
    /// A control channel is ready
    ChannelOpen {
        /// Channel handle
        channel: ChannelId,
    },
    /// A control channel went away
    ChannelClose {
        /// Channel handle
        channel: ChannelId,
    },
    /// Another peer is calling us
    IncomingCall {
        /// Call handle
        call: CallId,
        /// Caller identity
        peer: PeerId,
    },
    /// Media arrived on a call
    CallStream {
        /// Call handle
        call: CallId,
        /// Remote stream
        stream: MediaStream,
    },
    /// A call ended
    CallClose {
        /// Call handle
        call: CallId,
    },
    /// A call failed
    CallError {
        /// Call handle
        call: CallId,
        /// Classified kind
        kind: TransportErrorKind,
        /// Transport supplied detail
        message: String,
    },
}

impl TransportEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            TransportEvent::Open { .. } => "open",
            TransportEvent::Error { .. } => "error",
            TransportEvent::IncomingChannel { .. } => "incoming_channel",
            TransportEvent::ChannelOpen { .. } => "channel_open",
            TransportEvent::ChannelClose { .. } => "channel_close",
            TransportEvent::IncomingCall { .. } => "incoming_call",
            TransportEvent::CallStream { .. } => "call_stream",
            TransportEvent::CallClose { .. } => "call_close",
            TransportEvent::CallError { .. } => "call_error",
        }
    }
}

/// Rendezvous capability consumed by the sessions
pub trait SignalingTransport: Send {
    /// Ask for an identity. Completes with [`TransportEvent::Open`] or
    /// [`TransportEvent::Error`].
    fn open(&mut self) -> Result<(), CamlinkError>;

    /// Identity once assigned
    fn id(&self) -> Option<PeerId>;

    /// Open a control channel toward `target`
    fn connect(&mut self, target: &PeerId) -> Result<ChannelId, CamlinkError>;

    /// Call `target`, optionally offering a local stream.
    ///
    /// Returns `None` when no call object could be created.
    fn call(&mut self, target: &PeerId, local: Option<MediaStream>) -> Option<CallId>;

    /// Answer an incoming call with a stream
    fn answer(&mut self, call: CallId, stream: MediaStream) -> Result<(), CamlinkError>;

    /// Close a control channel. Closing twice has no further effect.
    fn close_channel(&mut self, channel: ChannelId);

    /// Close a call. Closing twice has no further effect.
    fn close_call(&mut self, call: CallId);

    /// Release the identity and everything attached to it
    fn destroy(&mut self);
}
