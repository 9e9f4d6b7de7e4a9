//! In-memory capture provider for tests and headless runs

use super::{CaptureConstraints, CaptureProvider, VideoDevice, VideoResolution};
use crate::error::{MediaError, MediaResult};
use crate::stream::{MediaStream, MediaTrack, StreamOrigin};
use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

/// Capture provider backed by virtual devices.
///
/// Like a real camera stack, a device that already has a live stream is
/// reported busy, and permission can be withdrawn to exercise failure paths.
#[derive(Debug)]
pub struct MockCaptureProvider {
    devices: Vec<VideoDevice>,
    permission_granted: Mutex<bool>,
    issued: Mutex<Vec<MediaStream>>,
}

impl MockCaptureProvider {
    /// Provider with the given devices and permission granted
    pub fn new(devices: Vec<VideoDevice>) -> Self {
        Self {
            devices,
            permission_granted: Mutex::new(true),
            issued: Mutex::new(Vec::new()),
        }
    }

    /// Front and back phone cameras
    pub fn phone() -> Self {
        Self::new(vec![
            VideoDevice::new(
                "front-0",
                "Front Camera",
                vec![VideoResolution::VGA, VideoResolution::HD],
            ),
            VideoDevice::new(
                "back-0",
                "Back Camera",
                vec![
                    VideoResolution::VGA,
                    VideoResolution::HD,
                    VideoResolution::FULL_HD,
                ],
            ),
        ])
    }

    /// Grant or withdraw camera permission
    pub fn set_permission(&self, granted: bool) {
        *self.permission_granted.lock() = granted;
    }

    /// Every stream handed out so far
    pub fn issued_streams(&self) -> Vec<MediaStream> {
        self.issued.lock().clone()
    }

    /// Number of streams still holding a device
    pub fn active_stream_count(&self) -> usize {
        self.issued.lock().iter().filter(|s| s.is_active()).count()
    }

    fn check_permission(&self, operation: &str) -> MediaResult<()> {
        if *self.permission_granted.lock() {
            Ok(())
        } else {
            Err(MediaError::PermissionDenied {
                operation: operation.to_string(),
            })
        }
    }

    fn select_device(&self, constraints: &CaptureConstraints) -> MediaResult<&VideoDevice> {
        match &constraints.device_id {
            Some(id) => self
                .devices
                .iter()
                .find(|d| &d.id == id)
                .ok_or_else(|| MediaError::DeviceNotFound {
                    device_id: id.clone(),
                }),
            None => self.devices.first().ok_or(MediaError::NoDevices),
        }
    }

    fn device_in_use(&self, device_id: &str) -> bool {
        self.issued.lock().iter().any(|stream| {
            stream.is_active()
                && matches!(stream.origin(), StreamOrigin::Local { device_id: d } if d == device_id)
        })
    }
}

impl Default for MockCaptureProvider {
    fn default() -> Self {
        Self::phone()
    }
}

#[async_trait]
impl CaptureProvider for MockCaptureProvider {
    async fn enumerate_devices(&self) -> MediaResult<Vec<VideoDevice>> {
        self.check_permission("enumerate video inputs")?;
        Ok(self.devices.clone())
    }

    async fn get_stream(&self, constraints: &CaptureConstraints) -> MediaResult<MediaStream> {
        self.check_permission("camera access")?;

        if constraints.audio {
            return Err(MediaError::InvalidConfiguration {
                message: "virtual devices have no audio input".to_string(),
            });
        }

        let device = self.select_device(constraints)?;
        if self.device_in_use(&device.id) {
            return Err(MediaError::DeviceBusy {
                device_id: device.id.clone(),
            });
        }

        let resolution = device
            .best_resolution(constraints.ideal_resolution)
            .ok_or_else(|| MediaError::InvalidConfiguration {
                message: format!("device {} reports no resolutions", device.id),
            })?;

        debug!(
            "Opening {} at {}x{} (ideal {}x{})",
            device.id,
            resolution.width,
            resolution.height,
            constraints.ideal_resolution.width,
            constraints.ideal_resolution.height
        );

        let stream = MediaStream::local(
            device.id.clone(),
            vec![MediaTrack::video(device.label.clone(), resolution)],
        );
        self.issued.lock().push(stream.clone());

        info!("Capture started on {} (stream {})", device.id, stream.id());
        Ok(stream)
    }
}
