//! User-visible status messages
//!
//! Every failure a session can hit ends up here as a readable message. Raw
//! transport codes only ever appear as secondary detail.

use crate::TransportErrorKind;
use serde::Serialize;
use std::fmt;

/// Status line shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusMessage {
    /// Broadcaster has no control channel attached
    WaitingForViewer,
    /// A viewer opened a control channel
    ViewerConnected,
    /// Capture is running
    CaptureActive,
    /// The camera could not be started
    CaptureError {
        /// Error reported by the capture provider
        reason: String,
    },
    /// Cameras could not be listed
    CameraAccessError {
        /// Error reported by the capture provider
        reason: String,
    },
    /// Viewer is requesting an identity
    Initializing,
    /// Viewer identity assigned, looking for the broadcaster
    SearchingCamera,
    /// Control channel open, call about to be placed
    SignalFound,
    /// Remote video is playing
    Streaming,
    /// Remote video is attached but the host blocked playback
    AutoplayBlocked,
    /// Broadcaster closed the call
    BroadcastEnded,
    /// Broadcaster closed the control channel
    HostDisconnected,
    /// The transport could not create a call
    CallFailed,
    /// The call reported an error
    CallError {
        /// Classified kind
        kind: TransportErrorKind,
    },
    /// The broadcaster never sent media
    NoResponse,
    /// Transport level failure
    TransportError {
        /// Classified kind
        kind: TransportErrorKind,
    },
}

impl StatusMessage {
    /// Primary text
    pub fn text(&self) -> String {
        match self {
            StatusMessage::WaitingForViewer => "Waiting for viewer...".to_string(),
            StatusMessage::ViewerConnected => "Connected to viewer!".to_string(),
            StatusMessage::CaptureActive => "Camera active (restart)".to_string(),
            StatusMessage::CaptureError { reason } => {
                format!("Error starting camera: {}", reason)
            }
            StatusMessage::CameraAccessError { .. } => {
                "Could not access camera permissions. Make sure the page is served over HTTPS."
                    .to_string()
            }
            StatusMessage::Initializing => "Initializing connection...".to_string(),
            StatusMessage::SearchingCamera => {
                "Connected to server. Looking for camera...".to_string()
            }
            StatusMessage::SignalFound => "Signal found. Requesting video...".to_string(),
            StatusMessage::Streaming => "Receiving video".to_string(),
            StatusMessage::AutoplayBlocked => {
                "Click to start video (autoplay blocked).".to_string()
            }
            StatusMessage::BroadcastEnded => "Broadcast ended by host.".to_string(),
            StatusMessage::HostDisconnected => "Camera disconnected.".to_string(),
            StatusMessage::CallFailed => {
                "Failed to start call (transport returned no call).".to_string()
            }
            StatusMessage::CallError { .. } => "Video call error.".to_string(),
            StatusMessage::NoResponse => {
                "Camera did not respond. Start the camera on the phone and reload.".to_string()
            }
            StatusMessage::TransportError { kind } => match kind {
                TransportErrorKind::PeerUnavailable => {
                    "Camera not found (wrong ID or offline).".to_string()
                }
                TransportErrorKind::Network => "Network error / connection failed.".to_string(),
                TransportErrorKind::BrowserIncompatible => "Incompatible browser.".to_string(),
                TransportErrorKind::Unknown(_) => "Unknown error".to_string(),
            },
        }
    }

    /// Secondary detail, such as the raw transport code
    pub fn detail(&self) -> Option<String> {
        match self {
            StatusMessage::CallError { kind } | StatusMessage::TransportError { kind } => {
                Some(kind.code().to_string())
            }
            StatusMessage::CameraAccessError { reason } => Some(reason.clone()),
            _ => None,
        }
    }

    /// Whether this reports a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            StatusMessage::CaptureError { .. }
                | StatusMessage::CameraAccessError { .. }
                | StatusMessage::CallFailed
                | StatusMessage::CallError { .. }
                | StatusMessage::NoResponse
                | StatusMessage::TransportError { .. }
        )
    }

    /// Whether the viewer overlay should be hidden
    pub fn hides_overlay(&self) -> bool {
        matches!(self, StatusMessage::Streaming)
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.detail() {
            Some(detail) => write!(f, "{} ({})", self.text(), detail),
            None => f.write_str(&self.text()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_distinct() {
        let kinds = [
            TransportErrorKind::PeerUnavailable,
            TransportErrorKind::Network,
            TransportErrorKind::BrowserIncompatible,
            TransportErrorKind::Unknown("server-error".to_string()),
        ];
        let texts: Vec<String> = kinds
            .iter()
            .map(|kind| StatusMessage::TransportError { kind: kind.clone() }.text())
            .collect();

        for (i, a) in texts.iter().enumerate() {
            for b in texts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_raw_code_is_only_detail() {
        let status = StatusMessage::TransportError {
            kind: TransportErrorKind::PeerUnavailable,
        };
        assert!(!status.text().contains("peer-unavailable"));
        assert_eq!(status.detail().as_deref(), Some("peer-unavailable"));
        assert_eq!(
            status.to_string(),
            "Camera not found (wrong ID or offline). (peer-unavailable)"
        );
        assert!(status.is_error());
    }

    #[test]
    fn test_unknown_error_keeps_code_as_detail() {
        let status = StatusMessage::TransportError {
            kind: TransportErrorKind::Unknown("socket-closed".to_string()),
        };
        assert_eq!(status.text(), "Unknown error");
        assert_eq!(status.detail().as_deref(), Some("socket-closed"));
    }

    #[test]
    fn test_progress_messages_are_not_errors() {
        for status in [
            StatusMessage::Initializing,
            StatusMessage::SearchingCamera,
            StatusMessage::SignalFound,
            StatusMessage::Streaming,
            StatusMessage::BroadcastEnded,
            StatusMessage::HostDisconnected,
        ] {
            assert!(!status.is_error(), "{:?}", status);
        }
        assert!(StatusMessage::Streaming.hides_overlay());
    }
}
