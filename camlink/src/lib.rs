//! # camlink - Phone Camera as a Peer-to-Peer Video Source
//!
//! camlink lets one device's camera feed a remote production tool over a
//! direct peer link. A page opened without a target parameter becomes the
//! **Broadcaster**: it captures the camera, publishes a shareable link and
//! answers incoming calls. A page opened through that link becomes the
//! **Viewer**: it reaches the broadcaster through the rendezvous transport,
//! places a receive-only call and renders what comes back.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use camlink::{Camlink, LocalBroker, MemorySink, MockCaptureProvider, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), camlink::CamlinkError> {
//!     let camlink = Camlink::init()?;
//!     let broker = LocalBroker::new();
//!
//!     let (transport, transport_events) = broker.endpoint();
//!     let (preview, _probe) = MemorySink::new("preview");
//!     let (session, mut events) = camlink
//!         .session("https://cam.example/")
//!         .transport(transport, transport_events)
//!         .capture(Arc::new(MockCaptureProvider::phone()))
//!         .preview(preview)
//!         .launch()?;
//!
//!     if let Session::Broadcaster(broadcaster) = &session {
//!         broadcaster.start_capture(Some("back-0")).await?;
//!     }
//!
//!     while let Some(event) = events.next().await {
//!         println!("Session event: {:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

// Re-export core types for easy access
pub use camlink_core::{CallId, CamlinkError, ChannelId, PeerId};

pub use camlink_media::{
    list_cameras, CameraList, CameraOption, CaptureConstraints, CaptureProvider, MediaError,
    MediaStream, MediaTrack, MemorySink, MockCaptureProvider, PlaybackOutcome, RenderSink,
    SinkProbe, StreamOrigin, VideoDevice, VideoResolution,
};

pub use camlink_signaling::{
    EventReceiver, LocalBroker, LocalTransport, RendezvousServer, SignalingTransport,
    TransportErrorKind, TransportEvent, WsTransport,
};

// Public API modules
pub mod broadcaster;
pub mod config;
pub mod event;
pub mod identity;
pub mod logging;
pub mod role;
pub mod status;
pub mod viewer;

// Re-export main API types
pub use broadcaster::{BroadcasterHandle, BroadcasterMachine, BroadcasterState};
pub use config::SessionConfig;
pub use event::{EventStream, SessionEvent};
pub use identity::{IdentityManager, IdentityState};
pub use role::{parse_page_url, select_role, shareable_link, SessionRole};
pub use status::StatusMessage;
pub use viewer::{ViewerFailure, ViewerHandle, ViewerMachine, ViewerPhase};

use broadcaster::BroadcasterSession;
use std::sync::Arc;
use tokio::sync::mpsc;
use viewer::ViewerSession;

/// Main entry point for camlink
#[derive(Debug, Clone)]
pub struct Camlink {
    config: SessionConfig,
}

impl Camlink {
    /// Initialize camlink with default settings
    ///
    /// # Example
    /// ```rust,no_run
    /// use camlink::Camlink;
    ///
    /// let camlink = Camlink::init()?;
    /// # Ok::<(), camlink::CamlinkError>(())
    /// ```
    pub fn init() -> Result<Self, CamlinkError> {
        Self::init_with(SessionConfig::default())
    }

    /// Initialize with custom configuration
    pub fn init_with(config: SessionConfig) -> Result<Self, CamlinkError> {
        config.validate()?;

        if let Err(e) = logging::init_logging(config.debug_logging) {
            // Someone else owns the global subscriber; keep theirs
            tracing::debug!("Keeping existing tracing subscriber: {}", e);
        }

        Ok(Self { config })
    }

    /// Active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start building a session for the page at `location`
    pub fn session(&self, location: &str) -> SessionBuilder {
        SessionBuilder::new(self.config.clone(), location)
    }
}

/// Fluent builder wiring a session to its collaborators
pub struct SessionBuilder {
    config: SessionConfig,
    location: String,
    transport: Option<(Box<dyn SignalingTransport>, EventReceiver)>,
    capture: Option<Arc<dyn CaptureProvider>>,
    preview: Option<Box<dyn RenderSink>>,
    remote_sink: Option<Box<dyn RenderSink>>,
}

impl SessionBuilder {
    pub(crate) fn new(config: SessionConfig, location: &str) -> Self {
        Self {
            config,
            location: location.to_string(),
            transport: None,
            capture: None,
            preview: None,
            remote_sink: None,
        }
    }

    /// Signaling transport and its event receiver (required)
    pub fn transport<T>(mut self, transport: T, events: EventReceiver) -> Self
    where
        T: SignalingTransport + 'static,
    {
        self.transport = Some((Box::new(transport), events));
        self
    }

    /// Capture provider (required for broadcasters)
    pub fn capture(mut self, provider: Arc<dyn CaptureProvider>) -> Self {
        self.capture = Some(provider);
        self
    }

    /// Local preview sink (required for broadcasters)
    pub fn preview<S>(mut self, sink: S) -> Self
    where
        S: RenderSink + 'static,
    {
        self.preview = Some(Box::new(sink));
        self
    }

    /// Sink for the received stream (required for viewers)
    pub fn remote_sink<S>(mut self, sink: S) -> Self
    where
        S: RenderSink + 'static,
    {
        self.remote_sink = Some(Box::new(sink));
        self
    }

    /// Role this builder will launch
    pub fn role(&self) -> SessionRole {
        select_role(&self.location, &self.config.view_param)
    }

    /// Select the role and spawn the session on the current tokio runtime
    pub fn launch(self) -> Result<(Session, EventStream), CamlinkError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| CamlinkError::Initialization {
                reason: format!("no tokio runtime: {}", e),
            })?;

        let role = self.role();
        let (transport, transport_events) =
            self.transport
                .ok_or_else(|| CamlinkError::MissingConfiguration {
                    field: "transport".to_string(),
                })?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let session = match role {
            SessionRole::Broadcaster => {
                let capture = self
                    .capture
                    .ok_or_else(|| CamlinkError::MissingConfiguration {
                        field: "capture".to_string(),
                    })?;
                let preview = self
                    .preview
                    .ok_or_else(|| CamlinkError::MissingConfiguration {
                        field: "preview".to_string(),
                    })?;

                let page_url = role::parse_page_url(&self.location)?;

                let (session, handle) = BroadcasterSession::new(
                    self.config,
                    page_url,
                    transport,
                    transport_events,
                    capture,
                    preview,
                    event_tx,
                );
                runtime.spawn(session.run());
                Session::Broadcaster(handle)
            }
            SessionRole::Viewer { target } => {
                let sink = self
                    .remote_sink
                    .ok_or_else(|| CamlinkError::MissingConfiguration {
                        field: "remote_sink".to_string(),
                    })?;

                let (session, handle) = ViewerSession::new(
                    &self.config,
                    target,
                    transport,
                    transport_events,
                    sink,
                    event_tx,
                );
                runtime.spawn(session.run());
                Session::Viewer(handle)
            }
        };

        Ok((session, EventStream::new(event_rx)))
    }
}

/// A running session in either role
#[derive(Debug, Clone)]
pub enum Session {
    /// Broadcaster side
    Broadcaster(BroadcasterHandle),
    /// Viewer side
    Viewer(ViewerHandle),
}

impl Session {
    /// Broadcaster handle, if this is a broadcaster
    pub fn as_broadcaster(&self) -> Option<&BroadcasterHandle> {
        match self {
            Session::Broadcaster(handle) => Some(handle),
            Session::Viewer(_) => None,
        }
    }

    /// Viewer handle, if this is a viewer
    pub fn as_viewer(&self) -> Option<&ViewerHandle> {
        match self {
            Session::Viewer(handle) => Some(handle),
            Session::Broadcaster(_) => None,
        }
    }

    /// Tear the session down
    pub async fn shutdown(&self) -> Result<(), CamlinkError> {
        match self {
            Session::Broadcaster(handle) => handle.shutdown().await,
            Session::Viewer(handle) => handle.shutdown().await,
        }
    }
}
