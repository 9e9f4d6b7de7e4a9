//! Rendezvous identity lifecycle

use crate::{CamlinkError, PeerId, SignalingTransport, TransportErrorKind, TransportEvent};
use tracing::{debug, info, warn};

/// Where the identity request stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// Not requested yet
    Unassigned,
    /// Requested, waiting for the transport
    Pending,
    /// Assigned by the transport
    Assigned(PeerId),
    /// The transport refused; no rendezvous is possible for this session
    Failed(TransportErrorKind),
}

/// Outcome of a pending identity request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityUpdate {
    /// Identity assigned
    Assigned(PeerId),
    /// Identity could not be assigned
    Failed {
        /// Classified kind
        kind: TransportErrorKind,
        /// Transport supplied detail
        message: String,
    },
}

/// Requests an identity and recognises the transport's answer
#[derive(Debug)]
pub struct IdentityManager {
    state: IdentityState,
}

impl IdentityManager {
    /// Manager with no identity requested
    pub fn new() -> Self {
        Self {
            state: IdentityState::Unassigned,
        }
    }

    /// Current state
    pub fn state(&self) -> &IdentityState {
        &self.state
    }

    /// Assigned identity, if any
    pub fn id(&self) -> Option<&PeerId> {
        match &self.state {
            IdentityState::Assigned(id) => Some(id),
            _ => None,
        }
    }

    /// Ask the transport for an identity. Only valid once.
    pub fn open(&mut self, transport: &mut dyn SignalingTransport) -> Result<(), CamlinkError> {
        if self.state != IdentityState::Unassigned {
            return Err(CamlinkError::InvalidState {
                expected: "unassigned".to_string(),
                actual: format!("{:?}", self.state),
            });
        }

        transport.open()?;
        self.state = IdentityState::Pending;
        debug!("Identity requested");
        Ok(())
    }

    /// Feed a transport event.
    ///
    /// Returns an update when the event settles a pending request; every
    /// other event is left for the session to handle.
    pub fn observe(&mut self, event: &TransportEvent) -> Option<IdentityUpdate> {
        if self.state != IdentityState::Pending {
            return None;
        }

        match event {
            TransportEvent::Open { id } => {
                info!("Identity assigned: {}", id);
                self.state = IdentityState::Assigned(id.clone());
                Some(IdentityUpdate::Assigned(id.clone()))
            }
            TransportEvent::Error { kind, message } => {
                warn!("Identity request failed ({}): {}", kind, message);
                self.state = IdentityState::Failed(kind.clone());
                Some(IdentityUpdate::Failed {
                    kind: kind.clone(),
                    message: message.clone(),
                })
            }
            _ => None,
        }
    }
}

impl Default for IdentityManager {
    fn default() -> Self {
        Self::new()
    }
}
