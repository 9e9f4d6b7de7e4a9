//! Viewer session
//!
//! The viewer drives the rendezvous: identity, control channel, a grace
//! delay, then a receive-only call whose stream goes to the render sink.
//! [`ViewerMachine`] decides; [`ViewerSession`] owns the transport, the sink
//! and the timers.

use crate::identity::{IdentityManager, IdentityUpdate};
use crate::{
    CallId, CamlinkError, ChannelId, EventReceiver, MediaStream, PeerId, PlaybackOutcome,
    RenderSink, SessionConfig, SessionEvent, SignalingTransport, StatusMessage,
    TransportErrorKind, TransportEvent,
};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Why a viewer gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerFailure {
    /// The target identity is not registered
    PeerUnavailable,
    /// The rendezvous service could not be reached
    NetworkError,
    /// This client cannot use the transport
    IncompatibleClient,
    /// Unclassified transport failure
    Unknown(String),
    /// The call could not be created or failed
    CallFailed,
    /// The broadcaster never sent media
    NoResponse,
}

impl ViewerFailure {
    /// Classify a transport error kind
    pub fn classify(kind: &TransportErrorKind) -> Self {
        match kind {
            TransportErrorKind::PeerUnavailable => ViewerFailure::PeerUnavailable,
            TransportErrorKind::Network => ViewerFailure::NetworkError,
            TransportErrorKind::BrowserIncompatible => ViewerFailure::IncompatibleClient,
            TransportErrorKind::Unknown(code) => ViewerFailure::Unknown(code.clone()),
        }
    }
}

/// Viewer progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerPhase {
    /// Waiting for an identity
    Initializing,
    /// Control channel requested
    Connecting,
    /// Control channel open; call scheduled
    ControlOpen,
    /// Call placed, no media yet
    CallPending,
    /// Media attached to the render sink
    StreamReceived,
    /// The broadcaster ended the call
    Disconnected,
    /// Terminal failure
    Failed(ViewerFailure),
}

impl ViewerPhase {
    /// Whether nothing more will happen in this session
    pub fn is_terminal(&self) -> bool {
        matches!(self, ViewerPhase::Disconnected | ViewerPhase::Failed(_))
    }
}

/// Inputs to [`ViewerMachine`]
#[derive(Debug, Clone)]
pub enum ViewerInput {
    /// Session started
    Start,
    /// Identity assigned
    IdentityAssigned(PeerId),
    /// Identity could not be assigned
    IdentityFailed {
        /// Classified kind
        kind: TransportErrorKind,
    },
    /// The transport created a control channel handle
    ChannelCreated(ChannelId),
    /// Control channel open
    ChannelOpened(ChannelId),
    /// Control channel closed
    ChannelClosed(ChannelId),
    /// The pre-call grace period is over
    GraceElapsed,
    /// Result of placing the call; `None` when no call object was created
    CallCreated(Option<CallId>),
    /// Media arrived on a call
    StreamArrived {
        /// Call handle
        call: CallId,
        /// Remote stream
        stream: MediaStream,
    },
    /// The sink refused to autoplay
    PlaybackBlocked,
    /// Playback started after a user gesture
    PlaybackResumed,
    /// A call ended
    CallClosed(CallId),
    /// A call failed
    CallErrored {
        /// Call handle
        call: CallId,
        /// Classified kind
        kind: TransportErrorKind,
    },
    /// Peer-level transport error
    TransportError {
        /// Classified kind
        kind: TransportErrorKind,
    },
    /// No media arrived in time
    CallTimedOut(CallId),
}

/// Side effects requested by [`ViewerMachine`]
#[derive(Debug, Clone)]
pub enum ViewerAction {
    /// Ask the transport for an identity
    OpenIdentity,
    /// Open a control channel to the target
    Connect(PeerId),
    /// Feed [`ViewerInput::GraceElapsed`] after this delay
    ScheduleCall(Duration),
    /// Place a receive-only call to the target
    InitiateCall(PeerId),
    /// Feed [`ViewerInput::CallTimedOut`] after this delay
    ScheduleCallTimeout(CallId, Duration),
    /// Drop the pending call timeout
    CancelCallTimeout,
    /// Attach a stream to the render sink
    Attach(MediaStream),
    /// Close a call
    CloseCall(CallId),
    /// Close a control channel
    CloseChannel(ChannelId),
    /// Release the transport identity
    DestroyTransport,
    /// Show a status line
    Status(StatusMessage),
}

/// Viewer state machine
#[derive(Debug)]
pub struct ViewerMachine {
    target: PeerId,
    grace_period: Duration,
    call_timeout: Option<Duration>,
    phase: ViewerPhase,
    channel: Option<ChannelId>,
    channel_closed: bool,
    call: Option<CallId>,
    call_closed: bool,
    identity_open: bool,
}

impl ViewerMachine {
    /// Machine targeting `target`
    pub fn new(target: PeerId, config: &SessionConfig) -> Self {
        Self {
            target,
            grace_period: config.call_grace_period,
            call_timeout: config.call_timeout,
            phase: ViewerPhase::Initializing,
            channel: None,
            channel_closed: false,
            call: None,
            call_closed: false,
            identity_open: false,
        }
    }

    /// Current phase
    pub fn phase(&self) -> &ViewerPhase {
        &self.phase
    }

    /// Broadcaster identity
    pub fn target(&self) -> &PeerId {
        &self.target
    }

    /// Call placed by this viewer, if any
    pub fn call(&self) -> Option<CallId> {
        self.call
    }

    /// Apply one input
    pub fn handle(&mut self, input: ViewerInput) -> Vec<ViewerAction> {
        use ViewerAction::Status;

        match input {
            ViewerInput::Start => vec![
                Status(StatusMessage::Initializing),
                ViewerAction::OpenIdentity,
            ],
            ViewerInput::IdentityAssigned(id) => {
                if self.phase != ViewerPhase::Initializing {
                    return Vec::new();
                }
                debug!("Viewer identity {} assigned, connecting to {}", id, self.target);
                self.identity_open = true;
                self.phase = ViewerPhase::Connecting;
                vec![
                    Status(StatusMessage::SearchingCamera),
                    ViewerAction::Connect(self.target.clone()),
                ]
            }
            ViewerInput::IdentityFailed { kind } | ViewerInput::TransportError { kind } => {
                self.fail(ViewerFailure::classify(&kind), StatusMessage::TransportError { kind })
            }
            ViewerInput::ChannelCreated(channel) => {
                self.channel = Some(channel);
                Vec::new()
            }
            ViewerInput::ChannelOpened(channel) => {
                if self.channel != Some(channel) || self.phase != ViewerPhase::Connecting {
                    return Vec::new();
                }
                info!("Control channel {} open", channel);
                self.phase = ViewerPhase::ControlOpen;
                vec![
                    Status(StatusMessage::SignalFound),
                    ViewerAction::ScheduleCall(self.grace_period),
                ]
            }
            ViewerInput::ChannelClosed(channel) => {
                if self.channel != Some(channel) || self.channel_closed {
                    return Vec::new();
                }
                info!("Host disconnected (channel {})", channel);
                self.channel_closed = true;
                // No call placed yet, so nothing else will settle the phase
                if self.phase == ViewerPhase::ControlOpen {
                    self.phase = ViewerPhase::Disconnected;
                }
                vec![Status(StatusMessage::HostDisconnected)]
            }
            ViewerInput::GraceElapsed => {
                if self.phase != ViewerPhase::ControlOpen || self.channel_closed {
                    debug!("Grace period over with no open channel, not calling");
                    return Vec::new();
                }
                info!("Calling {}", self.target);
                vec![ViewerAction::InitiateCall(self.target.clone())]
            }
            ViewerInput::CallCreated(None) => {
                error!("Transport returned no call object");
                self.fail(ViewerFailure::CallFailed, StatusMessage::CallFailed)
            }
            ViewerInput::CallCreated(Some(call)) => {
                if self.phase != ViewerPhase::ControlOpen {
                    return Vec::new();
                }
                self.call = Some(call);
                self.phase = ViewerPhase::CallPending;
                match self.call_timeout {
                    Some(timeout) => vec![ViewerAction::ScheduleCallTimeout(call, timeout)],
                    None => Vec::new(),
                }
            }
            ViewerInput::StreamArrived { call, stream } => {
                if !self.is_current_call(call) || self.phase != ViewerPhase::CallPending {
                    debug!("Ignoring stream {} on call {}", stream.id(), call);
                    return Vec::new();
                }
                info!("Video stream received on call {}", call);
                self.phase = ViewerPhase::StreamReceived;
                vec![
                    ViewerAction::CancelCallTimeout,
                    ViewerAction::Attach(stream),
                    Status(StatusMessage::Streaming),
                ]
            }
            ViewerInput::PlaybackBlocked => {
                if self.phase != ViewerPhase::StreamReceived {
                    return Vec::new();
                }
                vec![Status(StatusMessage::AutoplayBlocked)]
            }
            ViewerInput::PlaybackResumed => {
                if self.phase != ViewerPhase::StreamReceived {
                    return Vec::new();
                }
                vec![Status(StatusMessage::Streaming)]
            }
            ViewerInput::CallClosed(call) => {
                if !self.is_current_call(call) {
                    return Vec::new();
                }
                info!("Broadcast ended (call {})", call);
                self.call_closed = true;
                if !self.phase.is_terminal() {
                    self.phase = ViewerPhase::Disconnected;
                }
                vec![
                    ViewerAction::CancelCallTimeout,
                    Status(StatusMessage::BroadcastEnded),
                ]
            }
            ViewerInput::CallErrored { call, kind } => {
                if !self.is_current_call(call) {
                    return Vec::new();
                }
                warn!("Call {} failed: {}", call, kind);
                self.call_closed = true;
                self.fail(ViewerFailure::CallFailed, StatusMessage::CallError { kind })
            }
            ViewerInput::CallTimedOut(call) => {
                if !self.is_current_call(call) || self.phase != ViewerPhase::CallPending {
                    return Vec::new();
                }
                warn!("No stream on call {}; giving up", call);
                self.call_closed = true;
                let mut actions = self.fail(ViewerFailure::NoResponse, StatusMessage::NoResponse);
                actions.push(ViewerAction::CloseCall(call));
                actions
            }
        }
    }

    /// Release everything the session owns
    pub fn teardown(&mut self) -> Vec<ViewerAction> {
        let mut actions = vec![ViewerAction::CancelCallTimeout];
        if let Some(call) = self.call {
            if !self.call_closed {
                self.call_closed = true;
                actions.push(ViewerAction::CloseCall(call));
            }
        }
        if let Some(channel) = self.channel {
            if !self.channel_closed {
                self.channel_closed = true;
                actions.push(ViewerAction::CloseChannel(channel));
            }
        }
        if self.identity_open {
            self.identity_open = false;
            actions.push(ViewerAction::DestroyTransport);
        }
        actions
    }

    // Open and not yet closed
    fn is_current_call(&self, call: CallId) -> bool {
        self.call == Some(call) && !self.call_closed
    }

    fn fail(&mut self, failure: ViewerFailure, status: StatusMessage) -> Vec<ViewerAction> {
        if self.phase.is_terminal() {
            debug!("Already terminal; dropping {:?}", failure);
            return Vec::new();
        }
        self.phase = ViewerPhase::Failed(failure);
        vec![
            ViewerAction::CancelCallTimeout,
            ViewerAction::Status(status),
        ]
    }
}

/// Requests sent to a running viewer
#[derive(Debug)]
pub enum ViewerCommand {
    /// Retry playback after a user gesture
    ResumePlayback {
        /// Playback outcome; `None` when nothing is attached
        reply: oneshot::Sender<Option<PlaybackOutcome>>,
    },
    /// Tear the session down
    Shutdown {
        /// Signalled once teardown is complete
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running viewer session
#[derive(Debug, Clone)]
pub struct ViewerHandle {
    target: PeerId,
    commands: mpsc::UnboundedSender<ViewerCommand>,
}

impl ViewerHandle {
    /// Broadcaster this viewer targets
    pub fn target(&self) -> &PeerId {
        &self.target
    }

    /// Retry playback ("click to start")
    pub async fn resume_playback(&self) -> Result<Option<PlaybackOutcome>, CamlinkError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ViewerCommand::ResumePlayback { reply })
            .map_err(|_| CamlinkError::SessionClosed)?;
        response.await.map_err(|_| CamlinkError::SessionClosed)
    }

    /// Close the call and channel, release the identity
    pub async fn shutdown(&self) -> Result<(), CamlinkError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ViewerCommand::Shutdown { reply })
            .map_err(|_| CamlinkError::SessionClosed)?;
        response.await.map_err(|_| CamlinkError::SessionClosed)
    }
}

/// Task driving a [`ViewerMachine`]
pub struct ViewerSession {
    machine: ViewerMachine,
    identity: IdentityManager,
    transport: Box<dyn SignalingTransport>,
    transport_events: EventReceiver,
    sink: Box<dyn RenderSink>,
    commands: mpsc::UnboundedReceiver<ViewerCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    call_at: Option<Instant>,
    timeout_at: Option<(CallId, Instant)>,
}

impl ViewerSession {
    /// Build a session and the handle controlling it
    pub fn new(
        config: &SessionConfig,
        target: PeerId,
        transport: Box<dyn SignalingTransport>,
        transport_events: EventReceiver,
        sink: Box<dyn RenderSink>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> (Self, ViewerHandle) {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let session = Self {
            machine: ViewerMachine::new(target.clone(), config),
            identity: IdentityManager::new(),
            transport,
            transport_events,
            sink,
            commands,
            events,
            call_at: None,
            timeout_at: None,
        };
        let handle = ViewerHandle {
            target,
            commands: command_tx,
        };
        (session, handle)
    }

    /// Run until shut down or every handle is dropped
    pub async fn run(mut self) {
        info!("Viewer session starting for {}", self.machine.target());
        self.dispatch(ViewerInput::Start);

        loop {
            let call_at = self.call_at;
            let timeout_at = self.timeout_at;

            tokio::select! {
                _ = sleep_until_opt(call_at) => {
                    self.call_at = None;
                    self.dispatch(ViewerInput::GraceElapsed);
                }
                _ = sleep_until_opt(timeout_at.map(|(_, at)| at)) => {
                    self.timeout_at = None;
                    if let Some((call, _)) = timeout_at {
                        self.dispatch(ViewerInput::CallTimedOut(call));
                    }
                }
                event = self.transport_events.recv() => match event {
                    Some(event) => self.on_transport_event(event),
                    None => {
                        warn!("Transport event channel closed");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(ViewerCommand::ResumePlayback { reply }) => {
                        let outcome = self.resume_playback();
                        let _ = reply.send(outcome);
                    }
                    Some(ViewerCommand::Shutdown { reply }) => {
                        self.teardown();
                        let _ = reply.send(());
                        return;
                    }
                    None => {
                        debug!("All viewer handles dropped");
                        break;
                    }
                },
            }
        }

        self.teardown();
    }

    fn resume_playback(&mut self) -> Option<PlaybackOutcome> {
        let outcome = self.sink.resume()?;
        match &outcome {
            PlaybackOutcome::Playing => self.dispatch(ViewerInput::PlaybackResumed),
            PlaybackOutcome::AutoplayBlocked { reason } => {
                warn!("Playback still blocked: {}", reason);
                self.dispatch(ViewerInput::PlaybackBlocked);
            }
        }
        Some(outcome)
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        debug!("Viewer transport event: {}", event.event_type());

        if let Some(update) = self.identity.observe(&event) {
            match update {
                IdentityUpdate::Assigned(id) => {
                    self.emit(SessionEvent::IdentityAssigned { id: id.clone() });
                    self.dispatch(ViewerInput::IdentityAssigned(id));
                }
                IdentityUpdate::Failed { kind, .. } => {
                    self.dispatch(ViewerInput::IdentityFailed { kind })
                }
            }
            return;
        }

        let input = match event {
            TransportEvent::Error { kind, message } => {
                warn!("Transport error ({}): {}", kind, message);
                ViewerInput::TransportError { kind }
            }
            TransportEvent::ChannelOpen { channel } => ViewerInput::ChannelOpened(channel),
            TransportEvent::ChannelClose { channel } => ViewerInput::ChannelClosed(channel),
            TransportEvent::CallStream { call, stream } => {
                ViewerInput::StreamArrived { call, stream }
            }
            TransportEvent::CallClose { call } => ViewerInput::CallClosed(call),
            TransportEvent::CallError {
                call,
                kind,
                message,
            } => {
                debug!("Call {} error detail: {}", call, message);
                ViewerInput::CallErrored { call, kind }
            }
            TransportEvent::IncomingCall { call, peer } => {
                // Viewers never answer
                warn!("Ignoring incoming call {} from {}", call, peer);
                return;
            }
            TransportEvent::IncomingChannel { channel, peer } => {
                debug!("Ignoring incoming channel {} from {}", channel, peer);
                return;
            }
            TransportEvent::Open { .. } => return,
        };
        self.dispatch(input);
    }

    fn dispatch(&mut self, input: ViewerInput) {
        let before = self.machine.phase().clone();
        let actions = self.machine.handle(input);
        self.after(before, actions);
    }

    fn teardown(&mut self) {
        info!("Viewer session shutting down");
        let before = self.machine.phase().clone();
        let actions = self.machine.teardown();
        self.after(before, actions);
        self.sink.detach();
        self.emit(SessionEvent::Closed);
    }

    fn after(&mut self, before: ViewerPhase, actions: Vec<ViewerAction>) {
        let phase = self.machine.phase().clone();
        if phase != before {
            debug!("Viewer phase {:?} -> {:?}", before, phase);
            self.emit(SessionEvent::ViewerPhaseChanged { phase });
        }
        for action in actions {
            self.apply(action);
        }
    }

    fn apply(&mut self, action: ViewerAction) {
        match action {
            ViewerAction::OpenIdentity => {
                if let Err(e) = self.identity.open(self.transport.as_mut()) {
                    error!("Failed to request identity: {}", e);
                    self.dispatch(ViewerInput::IdentityFailed {
                        kind: TransportErrorKind::Unknown(e.error_code()),
                    });
                }
            }
            ViewerAction::Connect(target) => match self.transport.connect(&target) {
                Ok(channel) => self.dispatch(ViewerInput::ChannelCreated(channel)),
                Err(e) => {
                    error!("Failed to open control channel: {}", e);
                    self.dispatch(ViewerInput::TransportError {
                        kind: TransportErrorKind::Unknown(e.error_code()),
                    });
                }
            },
            ViewerAction::ScheduleCall(delay) => {
                debug!("Calling in {:?}", delay);
                self.call_at = Some(Instant::now() + delay);
            }
            ViewerAction::InitiateCall(target) => {
                let call = self.transport.call(&target, None);
                self.dispatch(ViewerInput::CallCreated(call));
            }
            ViewerAction::ScheduleCallTimeout(call, timeout) => {
                self.timeout_at = Some((call, Instant::now() + timeout));
            }
            ViewerAction::CancelCallTimeout => self.timeout_at = None,
            ViewerAction::Attach(stream) => {
                let outcome = self.sink.attach(stream.clone());
                self.emit(SessionEvent::StreamAttached { stream });
                if let PlaybackOutcome::AutoplayBlocked { reason } = outcome {
                    warn!("Auto-play prevented: {}", reason);
                    self.dispatch(ViewerInput::PlaybackBlocked);
                }
            }
            ViewerAction::CloseCall(call) => self.transport.close_call(call),
            ViewerAction::CloseChannel(channel) => self.transport.close_channel(channel),
            ViewerAction::DestroyTransport => self.transport.destroy(),
            ViewerAction::Status(status) => {
                debug!("Viewer status: {}", status);
                self.emit(SessionEvent::StatusChanged { status });
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MediaTrack, VideoResolution};

    fn machine() -> ViewerMachine {
        ViewerMachine::new(PeerId::new("host"), &SessionConfig::default())
    }

    fn stream() -> MediaStream {
        MediaStream::local("back-0", vec![MediaTrack::video("Cam", VideoResolution::HD)])
    }

    fn statuses(actions: &[ViewerAction]) -> Vec<StatusMessage> {
        actions
            .iter()
            .filter_map(|a| match a {
                ViewerAction::Status(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    // Drive a machine to CallPending and return the call id
    fn pending(machine: &mut ViewerMachine) -> CallId {
        machine.handle(ViewerInput::Start);
        machine.handle(ViewerInput::IdentityAssigned(PeerId::new("me")));
        let channel = ChannelId::new();
        machine.handle(ViewerInput::ChannelCreated(channel));
        machine.handle(ViewerInput::ChannelOpened(channel));
        machine.handle(ViewerInput::GraceElapsed);
        let call = CallId::new();
        machine.handle(ViewerInput::CallCreated(Some(call)));
        call
    }

    #[test]
    fn test_happy_path() {
        let mut m = machine();
        let actions = m.handle(ViewerInput::Start);
        assert!(matches!(actions[1], ViewerAction::OpenIdentity));

        let actions = m.handle(ViewerInput::IdentityAssigned(PeerId::new("me")));
        assert!(matches!(&actions[1], ViewerAction::Connect(t) if t.as_str() == "host"));
        assert_eq!(m.phase(), &ViewerPhase::Connecting);

        let channel = ChannelId::new();
        m.handle(ViewerInput::ChannelCreated(channel));
        let actions = m.handle(ViewerInput::ChannelOpened(channel));
        assert!(matches!(
            actions[1],
            ViewerAction::ScheduleCall(d) if d == Duration::from_secs(1)
        ));
        assert_eq!(m.phase(), &ViewerPhase::ControlOpen);

        let actions = m.handle(ViewerInput::GraceElapsed);
        assert!(matches!(&actions[..], [ViewerAction::InitiateCall(_)]));

        let call = CallId::new();
        let actions = m.handle(ViewerInput::CallCreated(Some(call)));
        assert!(matches!(
            actions[0],
            ViewerAction::ScheduleCallTimeout(c, d) if c == call && d == Duration::from_secs(15)
        ));
        assert_eq!(m.phase(), &ViewerPhase::CallPending);

        let actions = m.handle(ViewerInput::StreamArrived {
            call,
            stream: stream(),
        });
        assert!(matches!(actions[0], ViewerAction::CancelCallTimeout));
        assert!(matches!(actions[1], ViewerAction::Attach(_)));
        assert_eq!(statuses(&actions), vec![StatusMessage::Streaming]);
        assert_eq!(m.phase(), &ViewerPhase::StreamReceived);
    }

    #[test]
    fn test_no_call_object_is_call_failed() {
        let mut m = machine();
        m.handle(ViewerInput::Start);
        m.handle(ViewerInput::IdentityAssigned(PeerId::new("me")));
        let channel = ChannelId::new();
        m.handle(ViewerInput::ChannelCreated(channel));
        m.handle(ViewerInput::ChannelOpened(channel));

        let actions = m.handle(ViewerInput::CallCreated(None));
        assert_eq!(statuses(&actions), vec![StatusMessage::CallFailed]);
        assert_eq!(m.phase(), &ViewerPhase::Failed(ViewerFailure::CallFailed));
    }

    #[test]
    fn test_grace_elapsed_only_calls_once_channel_open() {
        let mut m = machine();
        m.handle(ViewerInput::Start);
        assert!(m.handle(ViewerInput::GraceElapsed).is_empty());
    }

    #[test]
    fn test_host_leaving_during_grace_cancels_call() {
        let mut m = machine();
        m.handle(ViewerInput::Start);
        m.handle(ViewerInput::IdentityAssigned(PeerId::new("me")));
        let channel = ChannelId::new();
        m.handle(ViewerInput::ChannelCreated(channel));
        m.handle(ViewerInput::ChannelOpened(channel));

        let closed = m.handle(ViewerInput::ChannelClosed(channel));
        assert_eq!(statuses(&closed), vec![StatusMessage::HostDisconnected]);
        assert_eq!(m.phase(), &ViewerPhase::Disconnected);

        let after_grace = m.handle(ViewerInput::GraceElapsed);
        assert!(
            !after_grace
                .iter()
                .any(|a| matches!(a, ViewerAction::InitiateCall(_))),
            "called a host that already left: {:?}",
            after_grace
        );
        assert_eq!(m.call(), None);
        assert_eq!(m.phase(), &ViewerPhase::Disconnected);
    }

    #[test]
    fn test_error_kinds_produce_distinct_statuses() {
        let mut network = machine();
        network.handle(ViewerInput::Start);
        let a = statuses(&network.handle(ViewerInput::TransportError {
            kind: TransportErrorKind::Network,
        }));

        let mut unavailable = machine();
        unavailable.handle(ViewerInput::Start);
        let b = statuses(&unavailable.handle(ViewerInput::TransportError {
            kind: TransportErrorKind::PeerUnavailable,
        }));

        assert_ne!(a[0].text(), b[0].text());
        assert_eq!(
            network.phase(),
            &ViewerPhase::Failed(ViewerFailure::NetworkError)
        );
        assert_eq!(
            unavailable.phase(),
            &ViewerPhase::Failed(ViewerFailure::PeerUnavailable)
        );
    }

    #[test]
    fn test_call_close_is_idempotent() {
        let mut m = machine();
        let call = pending(&mut m);
        m.handle(ViewerInput::StreamArrived {
            call,
            stream: stream(),
        });

        let first = m.handle(ViewerInput::CallClosed(call));
        assert_eq!(statuses(&first), vec![StatusMessage::BroadcastEnded]);
        assert_eq!(m.phase(), &ViewerPhase::Disconnected);

        let second = m.handle(ViewerInput::CallClosed(call));
        assert!(second.is_empty());
        assert_eq!(m.phase(), &ViewerPhase::Disconnected);
    }

    #[test]
    fn test_channel_and_call_close_in_same_tick() {
        let mut m = machine();
        let call = pending(&mut m);
        let channel = m.channel.unwrap();

        let a = m.handle(ViewerInput::ChannelClosed(channel));
        let b = m.handle(ViewerInput::CallClosed(call));
        assert_eq!(statuses(&a), vec![StatusMessage::HostDisconnected]);
        assert_eq!(statuses(&b), vec![StatusMessage::BroadcastEnded]);

        // And in the other order on a fresh machine
        let mut m = machine();
        let call = pending(&mut m);
        let channel = m.channel.unwrap();
        let b = m.handle(ViewerInput::CallClosed(call));
        let a = m.handle(ViewerInput::ChannelClosed(channel));
        assert_eq!(statuses(&a), vec![StatusMessage::HostDisconnected]);
        assert_eq!(statuses(&b), vec![StatusMessage::BroadcastEnded]);
        assert!(m.handle(ViewerInput::ChannelClosed(channel)).is_empty());
    }

    #[test]
    fn test_timeout_closes_call_and_reports_no_response() {
        let mut m = machine();
        let call = pending(&mut m);

        let actions = m.handle(ViewerInput::CallTimedOut(call));
        assert_eq!(statuses(&actions), vec![StatusMessage::NoResponse]);
        assert!(matches!(actions.last(), Some(ViewerAction::CloseCall(c)) if *c == call));
        assert_eq!(m.phase(), &ViewerPhase::Failed(ViewerFailure::NoResponse));

        // The transport's close echo changes nothing
        assert!(m.handle(ViewerInput::CallClosed(call)).is_empty());
        // Nor does a late stream
        assert!(m
            .handle(ViewerInput::StreamArrived {
                call,
                stream: stream()
            })
            .is_empty());
    }

    #[test]
    fn test_timeout_after_stream_is_ignored() {
        let mut m = machine();
        let call = pending(&mut m);
        m.handle(ViewerInput::StreamArrived {
            call,
            stream: stream(),
        });
        assert!(m.handle(ViewerInput::CallTimedOut(call)).is_empty());
        assert_eq!(m.phase(), &ViewerPhase::StreamReceived);
    }

    #[test]
    fn test_no_timeout_when_disabled() {
        let config = SessionConfig::default().with_call_timeout(None);
        let mut m = ViewerMachine::new(PeerId::new("host"), &config);
        m.handle(ViewerInput::Start);
        m.handle(ViewerInput::IdentityAssigned(PeerId::new("me")));
        let channel = ChannelId::new();
        m.handle(ViewerInput::ChannelCreated(channel));
        m.handle(ViewerInput::ChannelOpened(channel));
        m.handle(ViewerInput::GraceElapsed);
        assert!(m.handle(ViewerInput::CallCreated(Some(CallId::new()))).is_empty());
    }

    #[test]
    fn test_call_error_status_carries_kind() {
        let mut m = machine();
        let call = pending(&mut m);
        let actions = m.handle(ViewerInput::CallErrored {
            call,
            kind: TransportErrorKind::Unknown("negotiation-failed".to_string()),
        });
        let status = &statuses(&actions)[0];
        assert_eq!(status.text(), "Video call error.");
        assert_eq!(status.detail().as_deref(), Some("negotiation-failed"));
        assert_eq!(m.phase(), &ViewerPhase::Failed(ViewerFailure::CallFailed));
    }

    #[test]
    fn test_autoplay_blocked_status() {
        let mut m = machine();
        let call = pending(&mut m);
        m.handle(ViewerInput::StreamArrived {
            call,
            stream: stream(),
        });
        let actions = m.handle(ViewerInput::PlaybackBlocked);
        assert_eq!(statuses(&actions), vec![StatusMessage::AutoplayBlocked]);
        let actions = m.handle(ViewerInput::PlaybackResumed);
        assert_eq!(statuses(&actions), vec![StatusMessage::Streaming]);
    }

    #[test]
    fn test_teardown_closes_open_objects_once() {
        let mut m = machine();
        let call = pending(&mut m);

        let actions = m.teardown();
        assert!(actions
            .iter()
            .any(|a| matches!(a, ViewerAction::CloseCall(c) if *c == call)));
        assert!(actions
            .iter()
            .any(|a| matches!(a, ViewerAction::CloseChannel(_))));
        assert!(actions
            .iter()
            .any(|a| matches!(a, ViewerAction::DestroyTransport)));

        let again = m.teardown();
        assert!(matches!(&again[..], [ViewerAction::CancelCallTimeout]));
    }
}
