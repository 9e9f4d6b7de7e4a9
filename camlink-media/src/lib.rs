//! # camlink Media
//!
//! The capture/render boundary of camlink. Capture providers hand out
//! [`MediaStream`]s whose tracks can be stopped to release the device;
//! render sinks accept a stream and report whether playback started.
//!
//! Real camera access lives outside this crate behind [`CaptureProvider`];
//! [`MockCaptureProvider`] and [`MemorySink`] stand in for it in tests and
//! headless setups.

#![warn(clippy::all)]

pub mod capture;
pub mod error;
pub mod render;
pub mod stream;

// Re-export main types
pub use capture::{
    choose_default_device, list_cameras, CameraList, CameraOption, CaptureConstraints,
    CaptureProvider, MockCaptureProvider, VideoDevice, VideoResolution,
};
pub use error::{ErrorCategory, MediaError, MediaResult};
pub use render::{MemorySink, PlaybackOutcome, RenderSink, SinkProbe};
pub use stream::{
    MediaStream, MediaTrack, StreamDescriptor, StreamOrigin, TrackDescriptor, TrackKind,
    TrackState,
};
