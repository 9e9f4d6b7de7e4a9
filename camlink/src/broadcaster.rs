//! Broadcaster session
//!
//! [`BroadcasterMachine`] holds the capture and control-channel state and
//! turns inputs into actions without touching any collaborator.
//! [`BroadcasterSession`] is the task that feeds it from the transport and
//! carries out the actions.

use crate::identity::{IdentityManager, IdentityUpdate};
use crate::role::shareable_link;
use crate::{
    CallId, CamlinkError, CameraList, CaptureConstraints, CaptureProvider, ChannelId,
    EventReceiver, MediaStream, PeerId, RenderSink, SessionConfig, SessionEvent,
    SignalingTransport, StatusMessage, TransportErrorKind, TransportEvent,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use url::Url;

/// Whether a capture stream is live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No camera running
    NoStream,
    /// Camera running; incoming calls are answered with it
    StreamActive,
}

/// Whether a viewer holds a control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Nobody attached
    Idle,
    /// A viewer is attached on this channel
    Attached(ChannelId),
}

/// Combined broadcaster state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcasterState {
    /// Capture side
    pub capture: CaptureState,
    /// Control channel side
    pub channel: ChannelState,
}

/// Inputs to [`BroadcasterMachine`]
#[derive(Debug, Clone)]
pub enum BroadcasterInput {
    /// Session started
    Start,
    /// Identity assigned by the transport
    IdentityAssigned(PeerId),
    /// Identity could not be assigned
    IdentityFailed {
        /// Classified kind
        kind: TransportErrorKind,
    },
    /// Transport error after the identity was assigned
    TransportError {
        /// Classified kind
        kind: TransportErrorKind,
    },
    /// The user asked for a (new) capture
    CaptureRequested,
    /// Capture provider returned a stream
    CaptureStarted(MediaStream),
    /// Capture provider failed
    CaptureFailed {
        /// Provider error text
        reason: String,
    },
    /// A viewer opened a control channel
    IncomingChannel {
        /// Channel handle
        channel: ChannelId,
        /// Viewer identity
        peer: PeerId,
    },
    /// A control channel closed
    ChannelClosed(ChannelId),
    /// A viewer is calling
    IncomingCall {
        /// Call handle
        call: CallId,
        /// Viewer identity
        peer: PeerId,
    },
    /// A call ended
    CallClosed(CallId),
    /// A call failed
    CallErrored {
        /// Call handle
        call: CallId,
        /// Classified kind
        kind: TransportErrorKind,
    },
}

/// Side effects requested by [`BroadcasterMachine`]
#[derive(Debug, Clone)]
pub enum BroadcasterAction {
    /// Ask the transport for an identity
    OpenIdentity,
    /// Publish the shareable link for this identity
    PublishLink(PeerId),
    /// Stop every track of a stream
    StopTracks(MediaStream),
    /// Show a stream in the local preview
    AttachPreview(MediaStream),
    /// Answer a call with a stream
    Answer {
        /// Call to answer
        call: CallId,
        /// Stream to send
        stream: MediaStream,
    },
    /// Close a call
    CloseCall(CallId),
    /// Close a control channel
    CloseChannel(ChannelId),
    /// Release the transport identity
    DestroyTransport,
    /// Show a status line
    Status(StatusMessage),
}

/// Broadcaster state machine
#[derive(Debug)]
pub struct BroadcasterMachine {
    stream: Option<MediaStream>,
    channel: Option<ChannelId>,
    calls: HashSet<CallId>,
    identity_failed: bool,
}

impl BroadcasterMachine {
    /// Machine with no stream and no viewer
    pub fn new() -> Self {
        Self {
            stream: None,
            channel: None,
            calls: HashSet::new(),
            identity_failed: false,
        }
    }

    /// Current state
    pub fn state(&self) -> BroadcasterState {
        BroadcasterState {
            capture: if self.stream.is_some() {
                CaptureState::StreamActive
            } else {
                CaptureState::NoStream
            },
            channel: match self.channel {
                Some(channel) => ChannelState::Attached(channel),
                None => ChannelState::Idle,
            },
        }
    }

    /// Stream answered to callers, if any
    pub fn stream(&self) -> Option<&MediaStream> {
        self.stream.as_ref()
    }

    /// Calls answered and not yet closed
    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    /// Apply one input
    pub fn handle(&mut self, input: BroadcasterInput) -> Vec<BroadcasterAction> {
        match input {
            BroadcasterInput::Start => vec![
                BroadcasterAction::OpenIdentity,
                BroadcasterAction::Status(StatusMessage::WaitingForViewer),
            ],
            BroadcasterInput::IdentityAssigned(id) => vec![BroadcasterAction::PublishLink(id)],
            BroadcasterInput::IdentityFailed { kind } => {
                self.identity_failed = true;
                vec![BroadcasterAction::Status(StatusMessage::TransportError {
                    kind,
                })]
            }
            BroadcasterInput::TransportError { kind } => {
                vec![BroadcasterAction::Status(StatusMessage::TransportError {
                    kind,
                })]
            }
            BroadcasterInput::CaptureRequested => match self.stream.take() {
                // Release the old device before the provider opens the next one
                Some(previous) => vec![BroadcasterAction::StopTracks(previous)],
                None => Vec::new(),
            },
            BroadcasterInput::CaptureStarted(stream) => {
                let mut actions = Vec::new();
                if let Some(previous) = self.stream.replace(stream.clone()) {
                    actions.push(BroadcasterAction::StopTracks(previous));
                }
                actions.push(BroadcasterAction::AttachPreview(stream));
                actions.push(BroadcasterAction::Status(StatusMessage::CaptureActive));
                actions
            }
            BroadcasterInput::CaptureFailed { reason } => {
                vec![BroadcasterAction::Status(StatusMessage::CaptureError {
                    reason,
                })]
            }
            BroadcasterInput::IncomingChannel { channel, peer } => {
                info!("Viewer {} attached on channel {}", peer, channel);
                let mut actions = Vec::new();
                if let Some(previous) = self.channel.replace(channel) {
                    if previous != channel {
                        warn!("Channel {} replaced by {}, closing it", previous, channel);
                        actions.push(BroadcasterAction::CloseChannel(previous));
                    }
                }
                actions.push(BroadcasterAction::Status(StatusMessage::ViewerConnected));
                actions
            }
            BroadcasterInput::ChannelClosed(channel) => {
                if self.channel != Some(channel) {
                    debug!("Ignoring close of stale channel {}", channel);
                    return Vec::new();
                }
                info!("Viewer detached from channel {}", channel);
                self.channel = None;
                vec![BroadcasterAction::Status(StatusMessage::WaitingForViewer)]
            }
            BroadcasterInput::IncomingCall { call, peer } => match &self.stream {
                Some(stream) => {
                    info!("Answering call {} from {}", call, peer);
                    self.calls.insert(call);
                    vec![BroadcasterAction::Answer {
                        call,
                        stream: stream.clone(),
                    }]
                }
                None => {
                    warn!("call received without local stream ready (call {})", call);
                    Vec::new()
                }
            },
            BroadcasterInput::CallClosed(call) => {
                if self.calls.remove(&call) {
                    debug!("Call {} closed", call);
                }
                Vec::new()
            }
            BroadcasterInput::CallErrored { call, kind } => {
                warn!("Call {} failed: {}", call, kind);
                self.calls.remove(&call);
                Vec::new()
            }
        }
    }

    /// Release everything the session owns
    pub fn teardown(&mut self) -> Vec<BroadcasterAction> {
        let mut actions = Vec::new();
        if let Some(stream) = self.stream.take() {
            actions.push(BroadcasterAction::StopTracks(stream));
        }
        let mut calls: Vec<CallId> = self.calls.drain().collect();
        calls.sort_by_key(|call| call.as_uuid());
        actions.extend(calls.into_iter().map(BroadcasterAction::CloseCall));
        if let Some(channel) = self.channel.take() {
            actions.push(BroadcasterAction::CloseChannel(channel));
        }
        if !self.identity_failed {
            actions.push(BroadcasterAction::DestroyTransport);
        }
        actions
    }
}

impl Default for BroadcasterMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests sent to a running broadcaster
#[derive(Debug)]
pub enum BroadcasterCommand {
    /// Start or restart capture
    StartCapture {
        /// Device to open; `None` lets the provider choose
        device_id: Option<String>,
        /// Capture outcome
        reply: oneshot::Sender<Result<(), CamlinkError>>,
    },
    /// List cameras again
    ListCameras {
        /// Listing outcome
        reply: oneshot::Sender<Result<CameraList, CamlinkError>>,
    },
    /// Tear the session down
    Shutdown {
        /// Signalled once teardown is complete
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running broadcaster session
#[derive(Debug, Clone)]
pub struct BroadcasterHandle {
    commands: mpsc::UnboundedSender<BroadcasterCommand>,
}

impl BroadcasterHandle {
    /// Start capture on `device_id`, stopping any previous capture first
    pub async fn start_capture(&self, device_id: Option<&str>) -> Result<(), CamlinkError> {
        let (reply, response) = oneshot::channel();
        self.send(BroadcasterCommand::StartCapture {
            device_id: device_id.map(str::to_string),
            reply,
        })?;
        response.await.map_err(|_| CamlinkError::SessionClosed)?
    }

    /// List available cameras
    pub async fn list_cameras(&self) -> Result<CameraList, CamlinkError> {
        let (reply, response) = oneshot::channel();
        self.send(BroadcasterCommand::ListCameras { reply })?;
        response.await.map_err(|_| CamlinkError::SessionClosed)?
    }

    /// Stop capture, close channels and calls, release the identity
    pub async fn shutdown(&self) -> Result<(), CamlinkError> {
        let (reply, response) = oneshot::channel();
        self.send(BroadcasterCommand::Shutdown { reply })?;
        response.await.map_err(|_| CamlinkError::SessionClosed)
    }

    fn send(&self, command: BroadcasterCommand) -> Result<(), CamlinkError> {
        self.commands
            .send(command)
            .map_err(|_| CamlinkError::SessionClosed)
    }
}

/// Task driving a [`BroadcasterMachine`]
pub struct BroadcasterSession {
    config: SessionConfig,
    page_url: Url,
    machine: BroadcasterMachine,
    identity: IdentityManager,
    transport: Box<dyn SignalingTransport>,
    transport_events: EventReceiver,
    capture: Arc<dyn CaptureProvider>,
    preview: Box<dyn RenderSink>,
    commands: mpsc::UnboundedReceiver<BroadcasterCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl BroadcasterSession {
    /// Build a session and the handle controlling it
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SessionConfig,
        page_url: Url,
        transport: Box<dyn SignalingTransport>,
        transport_events: EventReceiver,
        capture: Arc<dyn CaptureProvider>,
        preview: Box<dyn RenderSink>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> (Self, BroadcasterHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let session = Self {
            config,
            page_url,
            machine: BroadcasterMachine::new(),
            identity: IdentityManager::new(),
            transport,
            transport_events,
            capture,
            preview,
            commands,
            events,
        };
        (
            session,
            BroadcasterHandle {
                commands: command_tx,
            },
        )
    }

    /// Run until shut down or every handle is dropped
    pub async fn run(mut self) {
        info!("Broadcaster session starting");
        self.dispatch(BroadcasterInput::Start);

        // Cameras are listed up front so the picker is ready before capture
        if let Err(e) = self.list_cameras().await {
            warn!("Initial camera listing failed: {}", e);
        }

        loop {
            tokio::select! {
                event = self.transport_events.recv() => match event {
                    Some(event) => self.on_transport_event(event),
                    None => {
                        warn!("Transport event channel closed");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(BroadcasterCommand::StartCapture { device_id, reply }) => {
                        let result = self.start_capture(device_id).await;
                        let _ = reply.send(result);
                    }
                    Some(BroadcasterCommand::ListCameras { reply }) => {
                        let result = self.list_cameras().await;
                        let _ = reply.send(result);
                    }
                    Some(BroadcasterCommand::Shutdown { reply }) => {
                        self.teardown();
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        debug!("All broadcaster handles dropped");
                        break;
                    }
                },
            }
        }

        self.teardown();
    }

    async fn start_capture(&mut self, device_id: Option<String>) -> Result<(), CamlinkError> {
        self.dispatch(BroadcasterInput::CaptureRequested);

        let constraints =
            CaptureConstraints::video(device_id.as_deref(), self.config.ideal_resolution);
        match self.capture.get_stream(&constraints).await {
            Ok(stream) => {
                self.dispatch(BroadcasterInput::CaptureStarted(stream));
                Ok(())
            }
            Err(e) => {
                error!("Failed to start camera: {}", e);
                self.dispatch(BroadcasterInput::CaptureFailed {
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    async fn list_cameras(&mut self) -> Result<CameraList, CamlinkError> {
        match camlink_media::list_cameras(self.capture.as_ref()).await {
            Ok(cameras) => {
                debug!("Listed {} cameras", cameras.options.len());
                self.emit(SessionEvent::CamerasListed {
                    cameras: cameras.clone(),
                });
                Ok(cameras)
            }
            Err(e) => {
                self.emit(SessionEvent::StatusChanged {
                    status: StatusMessage::CameraAccessError {
                        reason: e.to_string(),
                    },
                });
                Err(e.into())
            }
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        debug!("Broadcaster transport event: {}", event.event_type());

        if let Some(update) = self.identity.observe(&event) {
            match update {
                IdentityUpdate::Assigned(id) => {
                    self.dispatch(BroadcasterInput::IdentityAssigned(id))
                }
                IdentityUpdate::Failed { kind, .. } => {
                    self.dispatch(BroadcasterInput::IdentityFailed { kind })
                }
            }
            return;
        }

        let input = match event {
            TransportEvent::Error { kind, message } => {
                warn!("Transport error ({}): {}", kind, message);
                BroadcasterInput::TransportError { kind }
            }
            TransportEvent::IncomingChannel { channel, peer } => {
                BroadcasterInput::IncomingChannel { channel, peer }
            }
            TransportEvent::ChannelClose { channel } => BroadcasterInput::ChannelClosed(channel),
            TransportEvent::IncomingCall { call, peer } => {
                BroadcasterInput::IncomingCall { call, peer }
            }
            TransportEvent::CallClose { call } => BroadcasterInput::CallClosed(call),
            TransportEvent::CallError { call, kind, message } => {
                debug!("Call {} error detail: {}", call, message);
                BroadcasterInput::CallErrored { call, kind }
            }
            TransportEvent::Open { .. }
            | TransportEvent::ChannelOpen { .. }
            | TransportEvent::CallStream { .. } => return,
        };
        self.dispatch(input);
    }

    fn dispatch(&mut self, input: BroadcasterInput) {
        let before = self.machine.state();
        let actions = self.machine.handle(input);
        self.after(before, actions);
    }

    fn teardown(&mut self) {
        info!("Broadcaster session shutting down");
        let before = self.machine.state();
        let actions = self.machine.teardown();
        self.after(before, actions);
        self.preview.detach();
        self.emit(SessionEvent::Closed);
    }

    fn after(&mut self, before: BroadcasterState, actions: Vec<BroadcasterAction>) {
        let state = self.machine.state();
        if state != before {
            debug!("Broadcaster state {:?} -> {:?}", before, state);
            self.emit(SessionEvent::BroadcasterStateChanged { state });
        }
        for action in actions {
            self.apply(action);
        }
    }

    fn apply(&mut self, action: BroadcasterAction) {
        match action {
            BroadcasterAction::OpenIdentity => {
                if let Err(e) = self.identity.open(self.transport.as_mut()) {
                    error!("Failed to request identity: {}", e);
                    self.dispatch(BroadcasterInput::IdentityFailed {
                        kind: TransportErrorKind::Unknown(e.error_code()),
                    });
                }
            }
            BroadcasterAction::PublishLink(id) => {
                let url = shareable_link(&self.page_url, &self.config.view_param, &id);
                info!("Share this link with the viewer: {}", url);
                self.emit(SessionEvent::IdentityAssigned { id });
                self.emit(SessionEvent::LinkReady { url });
            }
            BroadcasterAction::StopTracks(stream) => {
                debug!("Releasing capture stream {}", stream.id());
                stream.stop_all_tracks();
            }
            BroadcasterAction::AttachPreview(stream) => {
                self.preview.attach(stream.clone());
                self.emit(SessionEvent::PreviewAttached { stream });
            }
            BroadcasterAction::Answer { call, stream } => {
                match self.transport.answer(call, stream) {
                    Ok(()) => self.emit(SessionEvent::CallAnswered { call }),
                    Err(e) => warn!("Failed to answer call {}: {}", call, e),
                }
            }
            BroadcasterAction::CloseCall(call) => self.transport.close_call(call),
            BroadcasterAction::CloseChannel(channel) => self.transport.close_channel(channel),
            BroadcasterAction::DestroyTransport => self.transport.destroy(),
            BroadcasterAction::Status(status) => {
                debug!("Broadcaster status: {}", status);
                self.emit(SessionEvent::StatusChanged { status });
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
