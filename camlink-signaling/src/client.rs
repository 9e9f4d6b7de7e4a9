//! WebSocket client for [`RendezvousServer`](crate::RendezvousServer)

use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::{EventReceiver, SignalingTransport, TransportErrorKind, TransportEvent};
use camlink_core::{CallId, CamlinkError, ChannelId, PeerId};
use camlink_media::MediaStream;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tungstenite::Message;

type EventSender = mpsc::UnboundedSender<TransportEvent>;

#[derive(Debug)]
enum Outgoing {
    Message(ClientMessage),
    Close,
}

#[derive(Debug, Default)]
struct ClientState {
    id: Option<PeerId>,
    // Remote identity of every call we know about
    calls: HashMap<CallId, PeerId>,
}

/// [`SignalingTransport`] backed by a WebSocket connection.
///
/// The trait methods only queue messages; replies and remote activity come
/// back through the [`EventReceiver`] returned by [`WsTransport::connect`].
#[derive(Debug)]
pub struct WsTransport {
    state: Arc<Mutex<ClientState>>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    events: EventSender,
    closing: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl WsTransport {
    /// Connect to a rendezvous server at `url` (`ws://host:port`)
    pub async fn connect(url: &str) -> Result<(Self, EventReceiver), CamlinkError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| CamlinkError::Transport {
                reason: format!("failed to reach {}: {}", url, e),
            })?;
        tracing::info!("Connected to rendezvous server at {}", url);

        let (mut sink, mut source) = ws_stream.split();
        let (outgoing, mut queue) = mpsc::unbounded_channel::<Outgoing>();
        let (events, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ClientState::default()));
        let closing = Arc::new(AtomicBool::new(false));

        tokio::spawn(async move {
            while let Some(item) = queue.recv().await {
                let frame = match item {
                    Outgoing::Message(message) => match serde_json::to_string(&message) {
                        Ok(json) => Message::Text(json),
                        Err(e) => {
                            tracing::error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    },
                    Outgoing::Close => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = sink.send(frame).await {
                    tracing::error!("Failed to send to rendezvous server: {}", e);
                    break;
                }
            }
        });

        let reader_state = state.clone();
        let reader_events = events.clone();
        let reader_closing = closing.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            let event = translate(&reader_state, message);
                            if reader_events.send(event).is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::warn!("Invalid message from server: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("Rendezvous connection error: {}", e);
                        break;
                    }
                }
            }

            if !reader_closing.load(Ordering::SeqCst) {
                let _ = reader_events.send(TransportEvent::Error {
                    kind: TransportErrorKind::Network,
                    message: "Lost connection to rendezvous service".to_string(),
                });
            }
        });

        let transport = Self {
            state,
            outgoing,
            events,
            closing,
            reader,
        };
        Ok((transport, receiver))
    }

    fn push(&self, message: ClientMessage) {
        if self.outgoing.send(Outgoing::Message(message)).is_err() {
            let _ = self.events.send(TransportEvent::Error {
                kind: TransportErrorKind::Network,
                message: "Rendezvous connection is closed".to_string(),
            });
        }
    }

    fn require_id(&self) -> Result<PeerId, CamlinkError> {
        self.state
            .lock()
            .id
            .clone()
            .ok_or_else(|| CamlinkError::IdentityUnavailable {
                reason: "no identity assigned yet".to_string(),
            })
    }
}

fn translate(state: &Mutex<ClientState>, message: ServerMessage) -> TransportEvent {
    match message {
        ServerMessage::Assigned { peer_id } => {
            state.lock().id = Some(peer_id.clone());
            TransportEvent::Open { id: peer_id }
        }
        ServerMessage::IncomingChannel { channel_id, source } => TransportEvent::IncomingChannel {
            channel: channel_id,
            peer: source,
        },
        ServerMessage::ChannelOpen { channel_id } => TransportEvent::ChannelOpen {
            channel: channel_id,
        },
        ServerMessage::ChannelClosed { channel_id } => TransportEvent::ChannelClose {
            channel: channel_id,
        },
        ServerMessage::IncomingCall {
            call_id, source, ..
        } => {
            state.lock().calls.insert(call_id, source.clone());
            TransportEvent::IncomingCall {
                call: call_id,
                peer: source,
            }
        }
        ServerMessage::CallAnswered { call_id, stream } => {
            let peer = state.lock().calls.get(&call_id).cloned();
            TransportEvent::CallStream {
                call: call_id,
                stream: MediaStream::from_descriptor(&stream, peer),
            }
        }
        ServerMessage::CallClosed { call_id } => {
            state.lock().calls.remove(&call_id);
            TransportEvent::CallClose { call: call_id }
        }
        ServerMessage::Error {
            kind,
            message,
            call_id: Some(call),
        } => TransportEvent::CallError {
            call,
            kind,
            message,
        },
        ServerMessage::Error { kind, message, .. } => TransportEvent::Error { kind, message },
    }
}

impl SignalingTransport for WsTransport {
    fn open(&mut self) -> Result<(), CamlinkError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(CamlinkError::SessionClosed);
        }
        self.push(ClientMessage::Register);
        Ok(())
    }

    fn id(&self) -> Option<PeerId> {
        self.state.lock().id.clone()
    }

    fn connect(&mut self, target: &PeerId) -> Result<ChannelId, CamlinkError> {
        self.require_id()?;
        let channel_id = ChannelId::new();
        self.push(ClientMessage::Connect {
            channel_id,
            target: target.clone(),
        });
        Ok(channel_id)
    }

    fn call(&mut self, target: &PeerId, local: Option<MediaStream>) -> Option<CallId> {
        self.state.lock().id.as_ref()?;
        let call_id = CallId::new();
        self.state.lock().calls.insert(call_id, target.clone());
        self.push(ClientMessage::Call {
            call_id,
            target: target.clone(),
            offer: local.map(|stream| stream.descriptor()),
        });
        Some(call_id)
    }

    fn answer(&mut self, call: CallId, stream: MediaStream) -> Result<(), CamlinkError> {
        if !self.state.lock().calls.contains_key(&call) {
            return Err(CamlinkError::CallNotFound {
                call_id: call.to_string(),
            });
        }
        self.push(ClientMessage::Answer {
            call_id: call,
            stream: stream.descriptor(),
        });
        Ok(())
    }

    fn close_channel(&mut self, channel: ChannelId) {
        self.push(ClientMessage::CloseChannel {
            channel_id: channel,
        });
    }

    fn close_call(&mut self, call: CallId) {
        self.push(ClientMessage::CloseCall { call_id: call });
    }

    fn destroy(&mut self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.lock().id = None;
        let _ = self.outgoing.send(Outgoing::Close);
        tracing::debug!("Rendezvous connection closing");
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.destroy();
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camlink_media::StreamDescriptor;

    #[test]
    fn test_translate_call_scoped_error() {
        let state = Mutex::new(ClientState::default());
        let call = CallId::new();
        let event = translate(
            &state,
            ServerMessage::call_error(call, TransportErrorKind::Network, "dropped"),
        );
        assert!(matches!(event, TransportEvent::CallError { call: c, .. } if c == call));

        let event = translate(
            &state,
            ServerMessage::error(TransportErrorKind::PeerUnavailable, "gone"),
        );
        assert!(matches!(
            event,
            TransportEvent::Error {
                kind: TransportErrorKind::PeerUnavailable,
                ..
            }
        ));
    }

    #[test]
    fn test_translate_stream_carries_remote_peer() {
        let state = Mutex::new(ClientState::default());
        let call = CallId::new();
        let host = PeerId::new("host");
        state.lock().calls.insert(call, host.clone());

        let event = translate(
            &state,
            ServerMessage::CallAnswered {
                call_id: call,
                stream: StreamDescriptor {
                    id: "remote-1".to_string(),
                    tracks: vec![],
                },
            },
        );
        match event {
            TransportEvent::CallStream { stream, .. } => {
                assert_eq!(stream.id(), "remote-1");
                assert_eq!(
                    stream.origin(),
                    &camlink_media::StreamOrigin::Remote { peer: Some(host) }
                );
            }
            other => panic!("Expected stream, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_sets_identity() {
        let state = Mutex::new(ClientState::default());
        let event = translate(
            &state,
            ServerMessage::Assigned {
                peer_id: PeerId::new("cam-7"),
            },
        );
        assert!(matches!(event, TransportEvent::Open { .. }));
        assert_eq!(state.lock().id, Some(PeerId::new("cam-7")));
    }
}
