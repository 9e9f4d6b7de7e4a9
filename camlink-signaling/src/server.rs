//! Rendezvous server
//!
//! Assigns identities to WebSocket connections and relays channel and call
//! traffic between them. Media never passes through here; only stream
//! descriptions do.

use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::TransportErrorKind;
use camlink_core::{CallId, CamlinkError, ChannelId, PeerId};
use camlink_media::StreamDescriptor;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

/// Outbound queue of a single connection
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// A registered identity
#[derive(Debug, Clone)]
pub struct PeerEntry {
    /// Connection the identity belongs to
    pub connection_id: String,
    /// Registration timestamp
    pub registered_at: chrono::DateTime<chrono::Utc>,
    outbound: Outbound,
}

#[derive(Debug, Clone)]
struct Link {
    source: PeerId,
    target: PeerId,
}

impl Link {
    fn other(&self, peer: &PeerId) -> Option<&PeerId> {
        if &self.source == peer {
            Some(&self.target)
        } else if &self.target == peer {
            Some(&self.source)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
struct CallLink {
    link: Link,
    offer: Option<StreamDescriptor>,
    answered: bool,
}

/// Identity, channel and call bookkeeping shared by all connections
#[derive(Debug, Clone, Default)]
pub struct Registry {
    peers: Arc<DashMap<PeerId, PeerEntry>>,
    connections: Arc<DashMap<String, PeerId>>,
    channels: Arc<DashMap<ChannelId, Link>>,
    calls: Arc<DashMap<CallId, CallLink>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one client message arriving on `connection_id`
    pub fn handle_message(&self, connection_id: &str, outbound: &Outbound, message: ClientMessage) {
        if let ClientMessage::Register = message {
            self.handle_register(connection_id, outbound);
            return;
        }

        let source = match self.connections.get(connection_id) {
            Some(entry) => entry.value().clone(),
            None => {
                let _ = outbound.send(ServerMessage::error(
                    TransportErrorKind::Unknown("unregistered".to_string()),
                    "register before sending signaling messages",
                ));
                return;
            }
        };

        match message {
            ClientMessage::Register => {}
            ClientMessage::Connect { channel_id, target } => {
                self.handle_connect(&source, channel_id, target)
            }
            ClientMessage::Call {
                call_id,
                target,
                offer,
            } => self.handle_call(&source, call_id, target, offer),
            ClientMessage::Answer { call_id, stream } => {
                self.handle_answer(&source, call_id, stream)
            }
            ClientMessage::CloseChannel { channel_id } => {
                if let Some((_, link)) = self.channels.remove(&channel_id) {
                    tracing::debug!("Channel {} closed by {}", channel_id, source);
                    let closed = ServerMessage::ChannelClosed { channel_id };
                    self.send_to(&link.source, closed.clone());
                    self.send_to(&link.target, closed);
                }
            }
            ClientMessage::CloseCall { call_id } => {
                if let Some((_, call)) = self.calls.remove(&call_id) {
                    tracing::debug!("Call {} closed by {}", call_id, source);
                    let closed = ServerMessage::CallClosed { call_id };
                    self.send_to(&call.link.source, closed.clone());
                    self.send_to(&call.link.target, closed);
                }
            }
        }
    }

    fn handle_register(&self, connection_id: &str, outbound: &Outbound) {
        let peer_id = match self.connections.get(connection_id) {
            Some(existing) => existing.value().clone(),
            None => {
                let peer_id = PeerId::generate();
                self.peers.insert(
                    peer_id.clone(),
                    PeerEntry {
                        connection_id: connection_id.to_string(),
                        registered_at: chrono::Utc::now(),
                        outbound: outbound.clone(),
                    },
                );
                self.connections
                    .insert(connection_id.to_string(), peer_id.clone());
                tracing::info!("Peer {} registered on {}", peer_id, connection_id);
                peer_id
            }
        };

        let _ = outbound.send(ServerMessage::Assigned { peer_id });
    }

    fn handle_connect(&self, source: &PeerId, channel_id: ChannelId, target: PeerId) {
        if !self.peers.contains_key(&target) {
            self.send_to(source, peer_unavailable(&target));
            return;
        }

        self.channels.insert(
            channel_id,
            Link {
                source: source.clone(),
                target: target.clone(),
            },
        );
        self.send_to(
            &target,
            ServerMessage::IncomingChannel {
                channel_id,
                source: source.clone(),
            },
        );
        self.send_to(&target, ServerMessage::ChannelOpen { channel_id });
        self.send_to(source, ServerMessage::ChannelOpen { channel_id });
        tracing::debug!("Channel {} open between {} and {}", channel_id, source, target);
    }

    fn handle_call(
        &self,
        source: &PeerId,
        call_id: CallId,
        target: PeerId,
        offer: Option<StreamDescriptor>,
    ) {
        if !self.peers.contains_key(&target) {
            self.send_to(source, peer_unavailable(&target));
            return;
        }

        self.calls.insert(
            call_id,
            CallLink {
                link: Link {
                    source: source.clone(),
                    target: target.clone(),
                },
                offer: offer.clone(),
                answered: false,
            },
        );
        self.send_to(
            &target,
            ServerMessage::IncomingCall {
                call_id,
                source: source.clone(),
                offer,
            },
        );
        tracing::debug!("Call {} from {} to {}", call_id, source, target);
    }

    fn handle_answer(&self, source: &PeerId, call_id: CallId, stream: StreamDescriptor) {
        let call = match self.calls.get_mut(&call_id) {
            Some(mut call) if &call.link.target == source && !call.answered => {
                call.answered = true;
                call.clone()
            }
            _ => {
                self.send_to(
                    source,
                    ServerMessage::call_error(
                        call_id,
                        TransportErrorKind::Unknown("unknown-call".to_string()),
                        format!("no pending call {} for {}", call_id, source),
                    ),
                );
                return;
            }
        };

        self.send_to(&call.link.source, ServerMessage::CallAnswered { call_id, stream });
        if let Some(offer) = call.offer {
            self.send_to(
                &call.link.target,
                ServerMessage::CallAnswered {
                    call_id,
                    stream: offer,
                },
            );
        }
    }

    /// Drop everything owned by a connection and tell the other ends
    pub fn disconnect(&self, connection_id: &str) {
        let Some((_, peer_id)) = self.connections.remove(connection_id) else {
            return;
        };
        self.peers.remove(&peer_id);

        let channels: Vec<ChannelId> = self
            .channels
            .iter()
            .filter(|entry| entry.value().other(&peer_id).is_some())
            .map(|entry| *entry.key())
            .collect();
        for channel_id in channels {
            if let Some((_, link)) = self.channels.remove(&channel_id) {
                if let Some(other) = link.other(&peer_id) {
                    self.send_to(other, ServerMessage::ChannelClosed { channel_id });
                }
            }
        }

        let calls: Vec<CallId> = self
            .calls
            .iter()
            .filter(|entry| entry.value().link.other(&peer_id).is_some())
            .map(|entry| *entry.key())
            .collect();
        for call_id in calls {
            if let Some((_, call)) = self.calls.remove(&call_id) {
                if let Some(other) = call.link.other(&peer_id) {
                    self.send_to(other, ServerMessage::CallClosed { call_id });
                }
            }
        }

        tracing::info!("Peer {} left ({})", peer_id, connection_id);
    }

    /// Number of registered identities
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Whether an identity is registered
    pub fn is_registered(&self, peer_id: &PeerId) -> bool {
        self.peers.contains_key(peer_id)
    }

    /// Registration details for an identity
    pub fn peer(&self, peer_id: &PeerId) -> Option<PeerEntry> {
        self.peers.get(peer_id).map(|entry| entry.value().clone())
    }

    fn send_to(&self, peer_id: &PeerId, message: ServerMessage) {
        // Clone the sender so no map guard is held while sending
        let outbound = self.peers.get(peer_id).map(|entry| entry.outbound.clone());
        if let Some(outbound) = outbound {
            if outbound.send(message).is_err() {
                tracing::warn!("Outbound queue for {} is closed", peer_id);
            }
        }
    }
}

fn peer_unavailable(target: &PeerId) -> ServerMessage {
    ServerMessage::error(
        TransportErrorKind::PeerUnavailable,
        format!("Could not connect to peer {}", target),
    )
}

/// WebSocket rendezvous server
#[derive(Debug)]
pub struct RendezvousServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Registry,
}

impl RendezvousServer {
    /// Bind the listening socket
    pub async fn bind(addr: SocketAddr) -> Result<Self, CamlinkError> {
        let listener =
            TcpListener::bind(addr)
                .await
                .map_err(|e| CamlinkError::ServerStartFailed {
                    address: addr,
                    source: e.into(),
                })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| CamlinkError::ServerStartFailed {
                address: addr,
                source: e.into(),
            })?;

        Ok(Self {
            listener,
            local_addr,
            registry: Registry::new(),
        })
    }

    /// Address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared registry handle
    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Accept connections until the task is cancelled
    pub async fn serve(self) -> Result<(), CamlinkError> {
        tracing::info!("Rendezvous server listening on {}", self.local_addr);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!("New connection from {}", addr);
                    let registry = self.registry.clone();
                    tokio::spawn(handle_connection(registry, stream));
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

async fn handle_connection(registry: Registry, stream: TcpStream) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let connection_id = Uuid::new_v4().to_string();
    tracing::debug!("WebSocket connection established: {}", connection_id);

    let (mut sink, mut source) = ws_stream.split();
    let (outbound, mut queue) = mpsc::unbounded_channel::<ServerMessage>();

    let writer_id = connection_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(json)).await {
                tracing::error!("Failed to send message to {}: {}", writer_id, e);
                break;
            }
        }
    });

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => registry.handle_message(&connection_id, &outbound, message),
                Err(e) => {
                    tracing::warn!("Invalid message format: {}", e);
                    let error = CamlinkError::InvalidMessage {
                        message: text,
                        source: e.into(),
                    };
                    let _ = outbound.send(ServerMessage::error(
                        TransportErrorKind::Unknown(error.error_code()),
                        error.to_string(),
                    ));
                }
            },
            Ok(Message::Close(_)) => {
                tracing::debug!("Connection {} closed", connection_id);
                break;
            }
            Err(e) => {
                tracing::error!("WebSocket error on connection {}: {}", connection_id, e);
                break;
            }
            Ok(_) => {
                // Binary, ping and pong frames carry nothing for us
            }
        }
    }

    registry.disconnect(&connection_id);
    drop(outbound);
    writer.abort();
}
