//! Render sinks for local previews and received streams

use crate::stream::MediaStream;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened when a stream was attached to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Playback started
    Playing,
    /// The host refused to start playback without a user gesture
    AutoplayBlocked {
        /// Reason reported by the host
        reason: String,
    },
}

impl PlaybackOutcome {
    /// Whether media is on screen
    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackOutcome::Playing)
    }
}

/// Something that can display a media stream
pub trait RenderSink: Send {
    /// Attach a stream, replacing any previous one, and try to start playback
    fn attach(&mut self, stream: MediaStream) -> PlaybackOutcome;

    /// Detach the current stream, if any
    fn detach(&mut self) -> Option<MediaStream>;

    /// Stream currently attached
    fn current(&self) -> Option<MediaStream>;

    /// Retry playback after a user gesture. `None` when nothing is attached.
    fn resume(&mut self) -> Option<PlaybackOutcome>;
}

#[derive(Debug, Default)]
struct SinkState {
    current: Option<MediaStream>,
    attach_count: usize,
}

/// Sink that records what it was given
#[derive(Debug)]
pub struct MemorySink {
    name: String,
    autoplay_blocked: bool,
    state: Arc<Mutex<SinkState>>,
}

/// Read-only view of a [`MemorySink`] that stays usable after the sink has
/// been moved into a session
#[derive(Debug, Clone)]
pub struct SinkProbe {
    state: Arc<Mutex<SinkState>>,
}

impl MemorySink {
    /// Create a sink and its probe
    pub fn new(name: impl Into<String>) -> (Self, SinkProbe) {
        let state = Arc::new(Mutex::new(SinkState::default()));
        let sink = Self {
            name: name.into(),
            autoplay_blocked: false,
            state: state.clone(),
        };
        (sink, SinkProbe { state })
    }

    /// Make every attach report a blocked autoplay
    pub fn with_autoplay_blocked(mut self) -> Self {
        self.autoplay_blocked = true;
        self
    }
}

impl RenderSink for MemorySink {
    fn attach(&mut self, stream: MediaStream) -> PlaybackOutcome {
        debug!("Attaching stream {} to {}", stream.id(), self.name);
        {
            let mut state = self.state.lock();
            state.current = Some(stream);
            state.attach_count += 1;
        }

        if self.autoplay_blocked {
            warn!("Autoplay blocked on {}", self.name);
            PlaybackOutcome::AutoplayBlocked {
                reason: "playback requires a user gesture".to_string(),
            }
        } else {
            PlaybackOutcome::Playing
        }
    }

    fn detach(&mut self) -> Option<MediaStream> {
        self.state.lock().current.take()
    }

    fn current(&self) -> Option<MediaStream> {
        self.state.lock().current.clone()
    }

    fn resume(&mut self) -> Option<PlaybackOutcome> {
        let state = self.state.lock();
        let stream = state.current.as_ref()?;
        debug!("Resuming playback of {} on {}", stream.id(), self.name);
        Some(PlaybackOutcome::Playing)
    }
}

impl SinkProbe {
    /// Stream currently attached to the sink
    pub fn current(&self) -> Option<MediaStream> {
        self.state.lock().current.clone()
    }

    /// How many times a stream was attached
    pub fn attach_count(&self) -> usize {
        self.state.lock().attach_count
    }
}
