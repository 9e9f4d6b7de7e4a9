//! In-process rendezvous
//!
//! [`LocalBroker`] plays the part of the rendezvous service for peers living
//! in the same process. Each [`LocalTransport`] endpoint gets its own event
//! channel, so two sessions can be wired together without a network.

use crate::transport::{EventReceiver, SignalingTransport, TransportErrorKind, TransportEvent};
use camlink_core::{CallId, ChannelId, CamlinkError, PeerId};
use camlink_media::MediaStream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type EventSender = mpsc::UnboundedSender<TransportEvent>;

#[derive(Debug, Clone)]
struct Link {
    source: PeerId,
    target: PeerId,
}

impl Link {
    fn involves(&self, peer: &PeerId) -> bool {
        &self.source == peer || &self.target == peer
    }
}

#[derive(Debug, Clone)]
struct CallRecord {
    link: Link,
    offered: Option<MediaStream>,
    answered: bool,
}

#[derive(Debug)]
struct BrokerState {
    peers: HashMap<PeerId, EventSender>,
    channels: HashMap<ChannelId, Link>,
    calls: HashMap<CallId, CallRecord>,
    reachable: bool,
}

impl BrokerState {
    fn send(&self, peer: &PeerId, event: TransportEvent) {
        if let Some(tx) = self.peers.get(peer) {
            let _ = tx.send(event);
        }
    }
}

/// Shared in-process rendezvous service
#[derive(Debug, Clone)]
pub struct LocalBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl LocalBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                peers: HashMap::new(),
                channels: HashMap::new(),
                calls: HashMap::new(),
                reachable: true,
            })),
        }
    }

    /// Create a transport endpoint and the receiver for its events
    pub fn endpoint(&self) -> (LocalTransport, EventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = LocalTransport {
            broker: self.clone(),
            id: None,
            events: tx,
        };
        (transport, rx)
    }

    /// Simulate the rendezvous service going away or coming back
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Whether an identity is currently registered
    pub fn is_registered(&self, id: &PeerId) -> bool {
        self.state.lock().peers.contains_key(id)
    }

    /// Number of registered identities
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    /// Number of open control channels
    pub fn channel_count(&self) -> usize {
        self.state.lock().channels.len()
    }

    /// Number of live calls
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Transport endpoint attached to a [`LocalBroker`]
#[derive(Debug)]
pub struct LocalTransport {
    broker: LocalBroker,
    id: Option<PeerId>,
    events: EventSender,
}

impl LocalTransport {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    fn require_id(&self) -> Result<PeerId, CamlinkError> {
        self.id
            .clone()
            .ok_or_else(|| CamlinkError::IdentityUnavailable {
                reason: "transport identity is not open".to_string(),
            })
    }

    fn peer_unavailable(&self, target: &PeerId) {
        self.emit(TransportEvent::Error {
            kind: TransportErrorKind::PeerUnavailable,
            message: format!("Could not connect to peer {}", target),
        });
    }

    fn network_down(&self) {
        self.emit(TransportEvent::Error {
            kind: TransportErrorKind::Network,
            message: "Lost connection to rendezvous service".to_string(),
        });
    }
}

impl SignalingTransport for LocalTransport {
    fn open(&mut self) -> Result<(), CamlinkError> {
        if self.id.is_some() {
            return Ok(());
        }

        let mut state = self.broker.state.lock();
        if !state.reachable {
            drop(state);
            self.network_down();
            return Ok(());
        }

        let id = PeerId::generate();
        state.peers.insert(id.clone(), self.events.clone());
        drop(state);

        info!("Registered identity {}", id);
        self.id = Some(id.clone());
        self.emit(TransportEvent::Open { id });
        Ok(())
    }

    fn id(&self) -> Option<PeerId> {
        self.id.clone()
    }

    fn connect(&mut self, target: &PeerId) -> Result<ChannelId, CamlinkError> {
        let source = self.require_id()?;
        let channel = ChannelId::new();

        let mut state = self.broker.state.lock();
        if !state.reachable {
            drop(state);
            self.network_down();
            return Ok(channel);
        }
        if !state.peers.contains_key(target) {
            drop(state);
            debug!("Connect from {} to unknown peer {}", source, target);
            self.peer_unavailable(target);
            return Ok(channel);
        }

        state.channels.insert(
            channel,
            Link {
                source: source.clone(),
                target: target.clone(),
            },
        );
        state.send(
            target,
            TransportEvent::IncomingChannel {
                channel,
                peer: source.clone(),
            },
        );
        state.send(target, TransportEvent::ChannelOpen { channel });
        state.send(&source, TransportEvent::ChannelOpen { channel });

        debug!("Channel {} open between {} and {}", channel, source, target);
        Ok(channel)
    }

    fn call(&mut self, target: &PeerId, local: Option<MediaStream>) -> Option<CallId> {
        let source = self.id.clone()?;
        let call = CallId::new();

        let mut state = self.broker.state.lock();
        if !state.peers.contains_key(target) {
            drop(state);
            self.peer_unavailable(target);
            return Some(call);
        }

        state.calls.insert(
            call,
            CallRecord {
                link: Link {
                    source: source.clone(),
                    target: target.clone(),
                },
                offered: local,
                answered: false,
            },
        );
        state.send(
            target,
            TransportEvent::IncomingCall {
                call,
                peer: source.clone(),
            },
        );

        debug!("Call {} from {} to {}", call, source, target);
        Some(call)
    }

    fn answer(&mut self, call: CallId, stream: MediaStream) -> Result<(), CamlinkError> {
        let me = self.require_id()?;
        let mut state = self.broker.state.lock();

        let record = match state.calls.get_mut(&call) {
            Some(record) if record.link.target == me => record,
            _ => {
                return Err(CamlinkError::CallNotFound {
                    call_id: call.to_string(),
                })
            }
        };

        if record.answered {
            warn!("Call {} already answered", call);
            return Ok(());
        }
        record.answered = true;
        let record = record.clone();

        state.send(&record.link.source, TransportEvent::CallStream { call, stream });
        if let Some(offered) = record.offered {
            state.send(
                &record.link.target,
                TransportEvent::CallStream {
                    call,
                    stream: offered,
                },
            );
        }

        debug!("Call {} answered by {}", call, me);
        Ok(())
    }

    fn close_channel(&mut self, channel: ChannelId) {
        let mut state = self.broker.state.lock();
        if let Some(link) = state.channels.remove(&channel) {
            state.send(&link.source, TransportEvent::ChannelClose { channel });
            state.send(&link.target, TransportEvent::ChannelClose { channel });
            debug!("Channel {} closed", channel);
        }
    }

    fn close_call(&mut self, call: CallId) {
        let mut state = self.broker.state.lock();
        if let Some(record) = state.calls.remove(&call) {
            state.send(&record.link.source, TransportEvent::CallClose { call });
            state.send(&record.link.target, TransportEvent::CallClose { call });
            debug!("Call {} closed", call);
        }
    }

    fn destroy(&mut self) {
        let Some(me) = self.id.take() else {
            return;
        };

        let mut state = self.broker.state.lock();
        state.peers.remove(&me);

        let channels: Vec<ChannelId> = state
            .channels
            .iter()
            .filter(|(_, link)| link.involves(&me))
            .map(|(id, _)| *id)
            .collect();
        for channel in channels {
            if let Some(link) = state.channels.remove(&channel) {
                let other = if link.source == me {
                    link.target
                } else {
                    link.source
                };
                state.send(&other, TransportEvent::ChannelClose { channel });
            }
        }

        let calls: Vec<CallId> = state
            .calls
            .iter()
            .filter(|(_, record)| record.link.involves(&me))
            .map(|(id, _)| *id)
            .collect();
        for call in calls {
            if let Some(record) = state.calls.remove(&call) {
                let other = if record.link.source == me {
                    record.link.target
                } else {
                    record.link.source
                };
                state.send(&other, TransportEvent::CallClose { call });
            }
        }

        info!("Identity {} released", me);
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        self.destroy();
    }
}
