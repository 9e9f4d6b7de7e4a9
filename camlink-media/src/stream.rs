//! Media stream and track handles
//!
//! A [`MediaStream`] is a cheap, clonable handle. Clones share track state, so
//! stopping a track through one handle is visible through every other handle,
//! which is what lets a session release a camera it handed to the transport.

use camlink_core::PeerId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::capture::VideoResolution;

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackKind {
    /// Video track
    Video,
    /// Audio track
    Audio,
}

/// Lifecycle of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Producing media
    Live,
    /// Stopped; the underlying device has been released
    Ended,
}

/// Where a stream came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOrigin {
    /// Captured from a local device
    Local {
        /// Device the stream was captured from
        device_id: String,
    },
    /// Received from a remote peer
    Remote {
        /// Peer that sent the stream, when known
        peer: Option<PeerId>,
    },
}

/// A single media track
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: String,
    kind: TrackKind,
    label: String,
    resolution: Option<VideoResolution>,
    state: Arc<RwLock<TrackState>>,
}

impl MediaTrack {
    /// Create a live video track
    pub fn video(label: impl Into<String>, resolution: VideoResolution) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: TrackKind::Video,
            label: label.into(),
            resolution: Some(resolution),
            state: Arc::new(RwLock::new(TrackState::Live)),
        }
    }

    fn from_descriptor(descriptor: &TrackDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            kind: descriptor.kind,
            label: descriptor.label.clone(),
            resolution: descriptor.resolution,
            state: Arc::new(RwLock::new(TrackState::Live)),
        }
    }

    /// Track ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Track kind
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Human readable label, usually the device name
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Negotiated resolution for video tracks
    pub fn resolution(&self) -> Option<VideoResolution> {
        self.resolution
    }

    /// Current state
    pub fn state(&self) -> TrackState {
        *self.state.read()
    }

    /// Whether the track is still producing media
    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// Stop the track. Stopping an ended track is a no-op.
    pub fn stop(&self) {
        let mut state = self.state.write();
        if *state == TrackState::Live {
            debug!("Stopping track {} ({})", self.id, self.label);
            *state = TrackState::Ended;
        }
    }

    fn descriptor(&self) -> TrackDescriptor {
        TrackDescriptor {
            id: self.id.clone(),
            kind: self.kind,
            label: self.label.clone(),
            resolution: self.resolution,
        }
    }
}

#[derive(Debug)]
struct StreamInner {
    id: String,
    origin: StreamOrigin,
    tracks: Vec<MediaTrack>,
}

/// Handle to a media stream made of one or more tracks
#[derive(Debug, Clone)]
pub struct MediaStream {
    inner: Arc<StreamInner>,
}

impl MediaStream {
    /// Build a locally captured stream
    pub fn local(device_id: impl Into<String>, tracks: Vec<MediaTrack>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: Uuid::new_v4().to_string(),
                origin: StreamOrigin::Local {
                    device_id: device_id.into(),
                },
                tracks,
            }),
        }
    }

    /// Materialise a stream received from a remote peer
    pub fn from_descriptor(descriptor: &StreamDescriptor, peer: Option<PeerId>) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: descriptor.id.clone(),
                origin: StreamOrigin::Remote { peer },
                tracks: descriptor
                    .tracks
                    .iter()
                    .map(MediaTrack::from_descriptor)
                    .collect(),
            }),
        }
    }

    /// Stream ID
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Stream origin
    pub fn origin(&self) -> &StreamOrigin {
        &self.inner.origin
    }

    /// All tracks
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    /// Video tracks only
    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.inner
            .tracks
            .iter()
            .filter(|t| t.kind() == TrackKind::Video)
    }

    /// Whether any track is still live
    pub fn is_active(&self) -> bool {
        self.inner.tracks.iter().any(MediaTrack::is_live)
    }

    /// Stop every track, releasing the capture device
    pub fn stop_all_tracks(&self) {
        for track in &self.inner.tracks {
            track.stop();
        }
    }

    /// Whether both handles refer to the very same stream object
    pub fn same_stream(&self, other: &MediaStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wire description of this stream
    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor {
            id: self.inner.id.clone(),
            tracks: self.inner.tracks.iter().map(MediaTrack::descriptor).collect(),
        }
    }
}

impl PartialEq for MediaStream {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for MediaStream {}

/// Serializable description of a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    /// Track ID
    pub id: String,
    /// Track kind
    pub kind: TrackKind,
    /// Track label
    pub label: String,
    /// Video resolution, if any
    pub resolution: Option<VideoResolution>,
}

/// Serializable description of a stream, as sent over a rendezvous link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Stream ID
    pub id: String,
    /// Track descriptions
    pub tracks: Vec<TrackDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_stream() -> MediaStream {
        MediaStream::local(
            "cam-0",
            vec![MediaTrack::video("Back Camera", VideoResolution::FULL_HD)],
        )
    }

    #[test]
    fn test_stop_is_shared_between_clones() {
        let stream = camera_stream();
        let handed_out = stream.clone();
        assert!(handed_out.is_active());

        stream.stop_all_tracks();
        assert!(!handed_out.is_active());
        assert!(handed_out
            .tracks()
            .iter()
            .all(|t| t.state() == TrackState::Ended));

        // Stopping twice is harmless
        stream.stop_all_tracks();
        assert!(!stream.is_active());
    }

    #[test]
    fn test_same_stream_identity() {
        let stream = camera_stream();
        let clone = stream.clone();
        let other = camera_stream();

        assert!(stream.same_stream(&clone));
        assert!(!stream.same_stream(&other));
        assert_ne!(stream, other);
    }

    #[test]
    fn test_descriptor_materialises_remote_stream() {
        let stream = camera_stream();
        let descriptor = stream.descriptor();
        let json = serde_json::to_string(&descriptor).unwrap();
        let parsed: StreamDescriptor = serde_json::from_str(&json).unwrap();

        let remote = MediaStream::from_descriptor(&parsed, Some(PeerId::new("broadcaster")));
        assert_eq!(remote, stream);
        assert!(!remote.same_stream(&stream));
        assert_eq!(remote.video_tracks().count(), 1);
        assert!(matches!(remote.origin(), StreamOrigin::Remote { peer: Some(_) }));

        // Remote track state is independent of the sender's
        stream.stop_all_tracks();
        assert!(remote.is_active());
    }
}
