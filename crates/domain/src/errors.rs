use thiserror::Error;

use crate::ports::GatewayError;

/// Camera and detector failures. Surfaced once; the capture loop never
/// retries on its own.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceFault {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("camera permission denied")]
    PermissionDenied,

    #[error("face detector failed to load: {0}")]
    DetectorUnavailable(String),

    #[error("face detection failed: {0}")]
    DetectionFailed(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Device error: {0}")]
    Device(#[from] DeviceFault),

    #[error("Resource {resource_id} changed state concurrently: {reason}")]
    TransientResourceState { resource_id: String, reason: String },

    #[error("Backend error: {message}")]
    UnrecoverableBackend { message: String },

    #[error("Entity not found: {entity}")]
    NotFound { entity: String },

    #[error("Uniqueness conflict: {field}")]
    Uniqueness { field: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Out-of-order capture: expected slot {expected}, got {received}")]
    OutOfOrderCapture { expected: String, received: String },

    #[error("Phase {phase} is already submitting")]
    AlreadySubmitting { phase: String },

    #[error("Workflow dismissed")]
    Dismissed,
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }
}

impl From<GatewayError> for Error {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotModifiable { resource_id, message }
            | GatewayError::ItemNotFound { resource_id, message } => {
                Error::TransientResourceState { resource_id, reason: message }
            }
            GatewayError::NotFound { entity } => Error::NotFound { entity },
            other => Error::UnrecoverableBackend { message: other.to_string() },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
