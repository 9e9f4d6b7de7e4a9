//! Identifiers exchanged with the signaling transport

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Rendezvous identity assigned by the signaling transport.
///
/// Opaque to everything except the transport that issued it. A Broadcaster's
/// identity is what ends up in the shareable link; a Viewer's identity is only
/// used to join the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    /// Wrap an identity string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow the raw identity
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identity is empty (never valid as a target)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Allocate a fresh identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Underlying UUID
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_id!(
    /// Control channel between two identities
    ChannelId
);

uuid_id!(
    /// Media call between two identities
    CallId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_peer_ids_are_unique() {
        let a = PeerId::generate();
        let b = PeerId::generate();
        assert_ne!(a, b);
        assert!(!a.is_empty());
    }

    #[test]
    fn test_peer_id_is_transparent_on_the_wire() {
        let id = PeerId::new("cam-42");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cam-42\"");

        let back: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert_eq!(back.to_string(), "cam-42");
    }

    #[test]
    fn test_call_and_channel_ids() {
        let call = CallId::new();
        assert_ne!(call, CallId::new());
        assert_eq!(call.to_string(), call.as_uuid().to_string());

        let channel = ChannelId::default();
        assert_ne!(channel, ChannelId::new());
    }
}
