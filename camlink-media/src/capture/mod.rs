//! Camera capture boundary
//!
//! The session layer never talks to a camera directly. It asks a
//! [`CaptureProvider`] for a stream matching [`CaptureConstraints`] and gets a
//! [`MediaStream`] back, or a [`MediaError`] describing why not.

mod mock;

pub use mock::MockCaptureProvider;

use crate::error::MediaResult;
use crate::stream::MediaStream;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoResolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoResolution {
    /// Create a resolution
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 640x480
    pub const VGA: Self = Self::new(640, 480);
    /// 1280x720
    pub const HD: Self = Self::new(1280, 720);
    /// 1920x1080
    pub const FULL_HD: Self = Self::new(1920, 1080);

    /// Total pixel count
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Whether either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A video input as reported by device enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDevice {
    /// Stable device identifier
    pub id: String,
    /// Device label; empty until camera permission has been granted
    pub label: String,
    /// Resolutions the device can deliver
    pub supported_resolutions: Vec<VideoResolution>,
}

impl VideoDevice {
    /// Create a device description
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        supported_resolutions: Vec<VideoResolution>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            supported_resolutions,
        }
    }

    /// Pick the resolution to deliver for an ideal hint.
    ///
    /// The hint is honoured exactly when supported; otherwise the largest mode
    /// that fits inside it wins, falling back to the smallest mode available.
    pub fn best_resolution(&self, ideal: VideoResolution) -> Option<VideoResolution> {
        if self.supported_resolutions.contains(&ideal) {
            return Some(ideal);
        }

        self.supported_resolutions
            .iter()
            .filter(|r| r.width <= ideal.width && r.height <= ideal.height)
            .max_by_key(|r| r.pixel_count())
            .or_else(|| {
                self.supported_resolutions
                    .iter()
                    .min_by_key(|r| r.pixel_count())
            })
            .copied()
    }
}

/// Constraints for a capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConstraints {
    /// Exact device to open; `None` lets the provider choose
    pub device_id: Option<String>,
    /// Preferred resolution, degraded when unavailable
    pub ideal_resolution: VideoResolution,
    /// Whether audio is requested
    pub audio: bool,
}

impl CaptureConstraints {
    /// Video-only constraints for a given device
    pub fn video(device_id: Option<&str>, ideal_resolution: VideoResolution) -> Self {
        Self {
            device_id: device_id.filter(|id| !id.is_empty()).map(str::to_string),
            ideal_resolution,
            audio: false,
        }
    }

    /// Minimal request used to unlock device labels
    pub fn probe() -> Self {
        Self::video(None, VideoResolution::VGA)
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::video(None, VideoResolution::FULL_HD)
    }
}

/// Source of local camera streams
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    /// List the video inputs currently attached
    async fn enumerate_devices(&self) -> MediaResult<Vec<VideoDevice>>;

    /// Open a stream matching the constraints
    async fn get_stream(&self, constraints: &CaptureConstraints) -> MediaResult<MediaStream>;
}

/// Entry of a camera picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraOption {
    /// Device identifier to pass back in [`CaptureConstraints`]
    pub device_id: String,
    /// Label to show, never empty
    pub label: String,
}

/// Result of [`list_cameras`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraList {
    /// Available cameras in enumeration order
    pub options: Vec<CameraOption>,
    /// Index of the camera to preselect
    pub default_index: usize,
}

impl CameraList {
    /// Device preselected in the picker
    pub fn default_device(&self) -> Option<&CameraOption> {
        self.options.get(self.default_index)
    }
}

const REAR_CAMERA_HINTS: [&str; 4] = ["back", "rear", "traseira", "environment"];

/// Index of the camera a phone user most likely wants: the last rear-facing
/// one, else the first.
pub fn choose_default_device(devices: &[VideoDevice]) -> Option<usize> {
    if devices.is_empty() {
        return None;
    }

    let rear = devices.iter().rposition(|device| {
        let label = device.label.to_lowercase();
        REAR_CAMERA_HINTS.iter().any(|hint| label.contains(hint))
    });

    Some(rear.unwrap_or(0))
}

/// Enumerate cameras for a picker.
///
/// A throwaway stream is opened and stopped first so the platform releases
/// device labels, then devices are listed and a default is chosen.
pub async fn list_cameras(provider: &dyn CaptureProvider) -> MediaResult<CameraList> {
    let probe = provider.get_stream(&CaptureConstraints::probe()).await?;
    probe.stop_all_tracks();

    let devices = provider.enumerate_devices().await?;
    let default_index = choose_default_device(&devices).unwrap_or(0);

    let options = devices
        .iter()
        .enumerate()
        .map(|(index, device)| CameraOption {
            device_id: device.id.clone(),
            label: if device.label.is_empty() {
                format!("Camera {}", index + 1)
            } else {
                device.label.clone()
            },
        })
        .collect::<Vec<_>>();

    debug!(
        "Found {} camera(s), defaulting to index {}",
        options.len(),
        default_index
    );

    Ok(CameraList {
        options,
        default_index,
    })
}
