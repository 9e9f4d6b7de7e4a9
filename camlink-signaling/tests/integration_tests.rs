//! Integration tests for the rendezvous transports
//!
//! Both transports must produce the same event sequences for the same
//! commands, so the scenarios here run against the in-process broker and a
//! real WebSocket server on localhost.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::time::timeout;

use camlink_core::PeerId;
use camlink_media::{MediaStream, MediaTrack, StreamOrigin, VideoResolution};
use camlink_signaling::{
    EventReceiver, LocalBroker, RendezvousServer, SignalingTransport, TransportErrorKind,
    TransportEvent, WsTransport,
};

const WAIT: Duration = Duration::from_secs(5);

fn camera_stream() -> MediaStream {
    MediaStream::local(
        "back-0",
        vec![MediaTrack::video("Back Camera", VideoResolution::FULL_HD)],
    )
}

async fn next_event(rx: &mut EventReceiver) -> TransportEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("transport event channel closed")
}

async fn open(transport: &mut impl SignalingTransport, rx: &mut EventReceiver) -> PeerId {
    transport.open().unwrap();
    match next_event(rx).await {
        TransportEvent::Open { id } => id,
        other => panic!("Expected open, got {:?}", other),
    }
}

async fn start_server() -> SocketAddr {
    let server = RendezvousServer::bind(SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0))
        .await
        .unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.serve());
    addr
}

// ============================================================================
// IN-PROCESS BROKER
// ============================================================================

#[tokio::test]
async fn test_broker_full_session() {
    let broker = LocalBroker::new();
    let (mut host, mut host_rx) = broker.endpoint();
    let (mut viewer, mut viewer_rx) = broker.endpoint();

    let host_id = open(&mut host, &mut host_rx).await;
    open(&mut viewer, &mut viewer_rx).await;

    let channel = viewer.connect(&host_id).unwrap();
    assert!(matches!(
        next_event(&mut host_rx).await,
        TransportEvent::IncomingChannel { .. }
    ));
    assert!(matches!(
        next_event(&mut host_rx).await,
        TransportEvent::ChannelOpen { .. }
    ));
    assert!(matches!(
        next_event(&mut viewer_rx).await,
        TransportEvent::ChannelOpen { channel: c } if c == channel
    ));

    let call = viewer.call(&host_id, None).unwrap();
    let incoming = match next_event(&mut host_rx).await {
        TransportEvent::IncomingCall { call, .. } => call,
        other => panic!("Expected incoming call, got {:?}", other),
    };
    assert_eq!(incoming, call);

    host.answer(incoming, camera_stream()).unwrap();
    assert!(matches!(
        next_event(&mut viewer_rx).await,
        TransportEvent::CallStream { .. }
    ));

    host.close_channel(channel);
    assert!(matches!(
        next_event(&mut viewer_rx).await,
        TransportEvent::ChannelClose { .. }
    ));
}

#[tokio::test]
async fn test_broker_answer_unknown_call_fails() {
    let broker = LocalBroker::new();
    let (mut host, mut host_rx) = broker.endpoint();
    open(&mut host, &mut host_rx).await;

    let err = tokio_test::assert_err!(host.answer(camlink_core::CallId::new(), camera_stream()));
    assert!(matches!(err, camlink_core::CamlinkError::CallNotFound { .. }));
}

#[tokio::test]
async fn test_broker_dropping_endpoint_releases_identity() {
    let broker = LocalBroker::new();
    let (mut host, mut host_rx) = broker.endpoint();
    let host_id = open(&mut host, &mut host_rx).await;

    drop(host);
    assert!(!broker.is_registered(&host_id));
    assert_eq!(broker.peer_count(), 0);
}

// ============================================================================
// WEBSOCKET RENDEZVOUS
// ============================================================================

#[tokio::test]
async fn test_ws_identity_assignment() {
    let addr = start_server().await;
    let (mut client, mut rx) = WsTransport::connect(&format!("ws://{}", addr))
        .await
        .unwrap();

    let id = open(&mut client, &mut rx).await;
    assert!(!id.is_empty());
    assert_eq!(client.id(), Some(id));
}

#[tokio::test]
async fn test_ws_connect_to_unknown_peer() {
    let addr = start_server().await;
    let (mut viewer, mut rx) = WsTransport::connect(&format!("ws://{}", addr))
        .await
        .unwrap();
    open(&mut viewer, &mut rx).await;

    viewer.connect(&PeerId::new("missing-host")).unwrap();
    match next_event(&mut rx).await {
        TransportEvent::Error { kind, message } => {
            assert_eq!(kind, TransportErrorKind::PeerUnavailable);
            assert!(message.contains("missing-host"));
        }
        other => panic!("Expected error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ws_call_delivers_remote_stream() {
    let addr = start_server().await;
    let url = format!("ws://{}", addr);
    let (mut host, mut host_rx) = WsTransport::connect(&url).await.unwrap();
    let (mut viewer, mut viewer_rx) = WsTransport::connect(&url).await.unwrap();

    let host_id = open(&mut host, &mut host_rx).await;
    open(&mut viewer, &mut viewer_rx).await;

    let call = viewer.call(&host_id, None).unwrap();
    let incoming = match next_event(&mut host_rx).await {
        TransportEvent::IncomingCall { call, .. } => call,
        other => panic!("Expected incoming call, got {:?}", other),
    };
    assert_eq!(incoming, call);

    let local = camera_stream();
    host.answer(incoming, local.clone()).unwrap();

    match next_event(&mut viewer_rx).await {
        TransportEvent::CallStream { call: c, stream } => {
            assert_eq!(c, call);
            assert_eq!(stream.id(), local.id());
            assert_eq!(
                stream.origin(),
                &StreamOrigin::Remote {
                    peer: Some(host_id)
                }
            );
            assert_eq!(
                stream.tracks()[0].resolution(),
                Some(VideoResolution::FULL_HD)
            );
        }
        other => panic!("Expected stream, got {:?}", other),
    }
}

#[tokio::test]
async fn test_ws_destroy_notifies_other_side() {
    let addr = start_server().await;
    let url = format!("ws://{}", addr);
    let (mut host, mut host_rx) = WsTransport::connect(&url).await.unwrap();
    let (mut viewer, mut viewer_rx) = WsTransport::connect(&url).await.unwrap();

    let host_id = open(&mut host, &mut host_rx).await;
    open(&mut viewer, &mut viewer_rx).await;

    let channel = viewer.connect(&host_id).unwrap();
    assert!(matches!(
        next_event(&mut viewer_rx).await,
        TransportEvent::ChannelOpen { .. }
    ));

    host.destroy();
    assert!(matches!(
        next_event(&mut viewer_rx).await,
        TransportEvent::ChannelClose { channel: c } if c == channel
    ));
}
