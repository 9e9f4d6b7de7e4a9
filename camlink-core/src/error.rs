//! Error types for camlink

use thiserror::Error;

/// Main error type for camlink operations
#[derive(Error, Debug)]
pub enum CamlinkError {
    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// Missing configuration error
    #[error("Missing required configuration: {field}")]
    MissingConfiguration {
        /// Missing configuration field
        field: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration {
        /// Offending configuration field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Signaling transport error
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason for transport error
        reason: String,
    },

    /// No identity has been assigned yet, or assignment failed
    #[error("Identity unavailable: {reason}")]
    IdentityUnavailable {
        /// Reason the identity is missing
        reason: String,
    },

    /// Call not found
    #[error("Call not found: {call_id}")]
    CallNotFound {
        /// Call ID that was not found
        call_id: String,
    },

    /// Media capture error
    #[error("Capture failed: {reason}")]
    Capture {
        /// Reason for capture failure
        reason: String,
    },

    /// Invalid state error
    #[error("Invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// The session actor is gone
    #[error("Session closed")]
    SessionClosed,

    /// Server start failed
    #[error("Failed to start server on {address}: {source}")]
    ServerStartFailed {
        /// Address that failed to bind
        address: std::net::SocketAddr,
        /// Underlying error
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Invalid message format
    #[error("Invalid message format: {message}, error: {source}")]
    InvalidMessage {
        /// Invalid message content
        message: String,
        /// Parsing error
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl CamlinkError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            CamlinkError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            CamlinkError::MissingConfiguration { .. } => "MISSING_CONFIGURATION".to_string(),
            CamlinkError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            CamlinkError::Transport { .. } => "TRANSPORT_ERROR".to_string(),
            CamlinkError::IdentityUnavailable { .. } => "IDENTITY_UNAVAILABLE".to_string(),
            CamlinkError::CallNotFound { .. } => "CALL_NOT_FOUND".to_string(),
            CamlinkError::Capture { .. } => "CAPTURE_FAILED".to_string(),
            CamlinkError::InvalidState { .. } => "INVALID_STATE".to_string(),
            CamlinkError::SessionClosed => "SESSION_CLOSED".to_string(),
            CamlinkError::ServerStartFailed { .. } => "SERVER_START_FAILED".to_string(),
            CamlinkError::InvalidMessage { .. } => "INVALID_MESSAGE".to_string(),
        }
    }
}
