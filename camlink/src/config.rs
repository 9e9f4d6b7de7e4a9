//! Configuration types and defaults

use crate::{CamlinkError, VideoResolution};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Query parameter that selects viewer mode and carries the target identity
    pub view_param: String,
    /// Delay between the control channel opening and the viewer placing its call
    pub call_grace_period: Duration,
    /// How long a viewer waits for media before giving up; `None` waits forever
    pub call_timeout: Option<Duration>,
    /// Resolution requested from the camera, degraded when unavailable
    pub ideal_resolution: VideoResolution,
    /// Enable debug logging
    pub debug_logging: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            view_param: "view".to_string(),
            call_grace_period: Duration::from_secs(1),
            call_timeout: Some(Duration::from_secs(15)),
            ideal_resolution: VideoResolution::FULL_HD,
            debug_logging: false,
        }
    }
}

impl SessionConfig {
    /// Set the viewer query parameter
    pub fn with_view_param(mut self, param: impl Into<String>) -> Self {
        self.view_param = param.into();
        self
    }

    /// Set the pre-call grace period
    pub fn with_call_grace_period(mut self, grace: Duration) -> Self {
        self.call_grace_period = grace;
        self
    }

    /// Set or disable the no-response timeout
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the preferred capture resolution
    pub fn with_ideal_resolution(mut self, resolution: VideoResolution) -> Self {
        self.ideal_resolution = resolution;
        self
    }

    /// Enable debug logging
    pub fn with_debug_logging(mut self, enabled: bool) -> Self {
        self.debug_logging = enabled;
        self
    }

    /// Check the configuration for values no session can work with
    pub fn validate(&self) -> Result<(), CamlinkError> {
        if self.view_param.trim().is_empty() {
            return Err(CamlinkError::InvalidConfiguration {
                field: "view_param".to_string(),
                reason: "must not be empty".to_string(),
            });
        }

        if self.ideal_resolution.is_empty() {
            return Err(CamlinkError::InvalidConfiguration {
                field: "ideal_resolution".to_string(),
                reason: format!(
                    "{}x{} has no pixels",
                    self.ideal_resolution.width, self.ideal_resolution.height
                ),
            });
        }

        if self.call_timeout == Some(Duration::ZERO) {
            return Err(CamlinkError::InvalidConfiguration {
                field: "call_timeout".to_string(),
                reason: "use None to wait indefinitely".to_string(),
            });
        }

        Ok(())
    }
}
