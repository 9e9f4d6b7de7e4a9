//! Media error types and handling
//!
//! Capture failures are reported to the user at the point of the capture
//! attempt and never retried automatically, so every variant carries enough
//! context to build a readable status line.

use camlink_core::CamlinkError;
use thiserror::Error;

/// Main error type for capture and render operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// The user or platform refused camera access
    #[error("Permission denied: {operation}")]
    PermissionDenied {
        /// Operation that was denied
        operation: String,
    },

    /// Device not found error
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// Device identifier
        device_id: String,
    },

    /// Device is held by another stream or application
    #[error("Device busy: {device_id}")]
    DeviceBusy {
        /// Device identifier
        device_id: String,
    },

    /// No video input is present at all
    #[error("No video input devices available")]
    NoDevices,

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if the user can reasonably fix the cause and try again
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::PermissionDenied { .. } => true,
            MediaError::DeviceBusy { .. } => true,
            MediaError::DeviceNotFound { .. } => true,
            MediaError::NoDevices => false,
            MediaError::InvalidConfiguration { .. } => false,
        }
    }

    /// Get error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            MediaError::PermissionDenied { .. } => ErrorCategory::Permission,
            MediaError::DeviceNotFound { .. } => ErrorCategory::Device,
            MediaError::DeviceBusy { .. } => ErrorCategory::Device,
            MediaError::NoDevices => ErrorCategory::Device,
            MediaError::InvalidConfiguration { .. } => ErrorCategory::Configuration,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Access to the device was refused
    Permission,
    /// Device and hardware errors
    Device,
    /// Configuration and parameter errors
    Configuration,
}

impl From<MediaError> for CamlinkError {
    fn from(error: MediaError) -> Self {
        CamlinkError::Capture {
            reason: error.to_string(),
        }
    }
}
