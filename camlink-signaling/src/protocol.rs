//! Rendezvous wire protocol
//!
//! Text frames carrying JSON. Clients pick channel and call ids themselves so
//! the synchronous transport calls can return a handle immediately.

use crate::transport::TransportErrorKind;
use camlink_core::{CallId, ChannelId, PeerId};
use camlink_media::StreamDescriptor;
use serde::{Deserialize, Serialize};

/// Messages sent by a client to the rendezvous server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for an identity
    Register,
    /// Open a control channel
    Connect {
        /// Client chosen channel id
        channel_id: ChannelId,
        /// Identity to connect to
        target: PeerId,
    },
    /// Place a call
    Call {
        /// Client chosen call id
        call_id: CallId,
        /// Identity to call
        target: PeerId,
        /// Stream offered by the caller, if any
        offer: Option<StreamDescriptor>,
    },
    /// Answer an incoming call
    Answer {
        /// Call being answered
        call_id: CallId,
        /// Stream sent back to the caller
        stream: StreamDescriptor,
    },
    /// Close a control channel
    CloseChannel {
        /// Channel to close
        channel_id: ChannelId,
    },
    /// Close a call
    CloseCall {
        /// Call to close
        call_id: CallId,
    },
}

/// Messages sent by the rendezvous server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Identity assigned to this connection
    Assigned {
        /// The new identity
        peer_id: PeerId,
    },
    /// Another peer opened a channel to us
    IncomingChannel {
        /// Channel id
        channel_id: ChannelId,
        /// Peer that opened it
        source: PeerId,
    },
    /// Channel is ready on both ends
    ChannelOpen {
        /// Channel id
        channel_id: ChannelId,
    },
    /// Channel went away
    ChannelClosed {
        /// Channel id
        channel_id: ChannelId,
    },
    /// Another peer is calling
    IncomingCall {
        /// Call id
        call_id: CallId,
        /// Caller identity
        source: PeerId,
        /// Stream offered by the caller
        offer: Option<StreamDescriptor>,
    },
    /// Media for a call
    CallAnswered {
        /// Call id
        call_id: CallId,
        /// Stream description
        stream: StreamDescriptor,
    },
    /// Call ended
    CallClosed {
        /// Call id
        call_id: CallId,
    },
    /// Failure report
    Error {
        /// Classified kind
        kind: TransportErrorKind,
        /// Human readable detail
        message: String,
        /// Call the failure belongs to, when it is call scoped
        #[serde(default, skip_serializing_if = "Option::is_none")]
        call_id: Option<CallId>,
    },
}

impl ServerMessage {
    /// Peer-level error
    pub fn error(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind,
            message: message.into(),
            call_id: None,
        }
    }

    /// Call scoped error
    pub fn call_error(call_id: CallId, kind: TransportErrorKind, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            kind,
            message: message.into(),
            call_id: Some(call_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_is_tagged() {
        let json = serde_json::to_value(ClientMessage::Register).unwrap();
        assert_eq!(json["type"], "register");

        let target = PeerId::new("host-1");
        let msg = ClientMessage::Connect {
            channel_id: ChannelId::new(),
            target: target.clone(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "connect");
        assert_eq!(json["target"], "host-1");
    }

    #[test]
    fn test_parse_call_without_offer() {
        let call_id = CallId::new();
        let text = format!(
            r#"{{"type":"call","call_id":"{}","target":"host-1","offer":null}}"#,
            call_id
        );
        let msg: ClientMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Call {
                call_id,
                target: PeerId::new("host-1"),
                offer: None,
            }
        );
    }

    #[test]
    fn test_error_without_call_id() {
        let msg = ServerMessage::error(TransportErrorKind::PeerUnavailable, "gone");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["kind"], "peer-unavailable");
        assert!(json.get("call_id").is_none());

        let parsed: ServerMessage =
            serde_json::from_str(r#"{"type":"error","kind":"ssl-unavailable","message":"x"}"#)
                .unwrap();
        assert_eq!(
            parsed,
            ServerMessage::error(TransportErrorKind::Unknown("ssl-unavailable".into()), "x")
        );
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        let result = serde_json::from_str::<ClientMessage>(r#"{"type":"join_room"}"#);
        assert!(result.is_err());
    }
}
