//! Session events

use crate::broadcaster::BroadcasterState;
use crate::viewer::ViewerPhase;
use crate::{CallId, CameraList, MediaStream, PeerId, StatusMessage};
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Everything a session reports to the embedding UI
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The transport assigned this session an identity
    IdentityAssigned {
        /// Assigned identity
        id: PeerId,
    },
    /// Broadcaster link ready to be shared
    LinkReady {
        /// Full viewer URL
        url: String,
    },
    /// Camera picker contents
    CamerasListed {
        /// Available cameras and the preselected one
        cameras: CameraList,
    },
    /// New status line
    StatusChanged {
        /// Status to show
        status: StatusMessage,
    },
    /// Broadcaster capture or channel state changed
    BroadcasterStateChanged {
        /// New state
        state: BroadcasterState,
    },
    /// Viewer moved to a new phase
    ViewerPhaseChanged {
        /// New phase
        phase: ViewerPhase,
    },
    /// Local capture attached to the preview
    PreviewAttached {
        /// Captured stream
        stream: MediaStream,
    },
    /// Remote stream attached to the render sink
    StreamAttached {
        /// Received stream
        stream: MediaStream,
    },
    /// Broadcaster answered a call
    CallAnswered {
        /// Answered call
        call: CallId,
    },
    /// The session finished tearing down
    Closed,
}

impl SessionEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::IdentityAssigned { .. } => "identity_assigned",
            SessionEvent::LinkReady { .. } => "link_ready",
            SessionEvent::CamerasListed { .. } => "cameras_listed",
            SessionEvent::StatusChanged { .. } => "status_changed",
            SessionEvent::BroadcasterStateChanged { .. } => "broadcaster_state_changed",
            SessionEvent::ViewerPhaseChanged { .. } => "viewer_phase_changed",
            SessionEvent::PreviewAttached { .. } => "preview_attached",
            SessionEvent::StreamAttached { .. } => "stream_attached",
            SessionEvent::CallAnswered { .. } => "call_answered",
            SessionEvent::Closed => "closed",
        }
    }

    /// Status carried by the event, if it is a status change
    pub fn status(&self) -> Option<&StatusMessage> {
        match self {
            SessionEvent::StatusChanged { status } => Some(status),
            _ => None,
        }
    }
}

/// Stream of session events
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<SessionEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<SessionEvent> {
        self.receiver.recv().await
    }

    /// Skip events until one matches `predicate`
    pub async fn next_matching<F>(&mut self, mut predicate: F) -> Option<SessionEvent>
    where
        F: FnMut(&SessionEvent) -> bool,
    {
        while let Some(event) = self.receiver.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<SessionEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Drain everything already queued
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        std::iter::from_fn(|| self.receiver.try_recv().ok()).collect()
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

impl Stream for EventStream {
    type Item = SessionEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
