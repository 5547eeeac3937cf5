//! Guided enrollment and ordering workflows for the booking client

/// Reserve-then-enroll coordination
pub mod booking;

/// Biometric and document capture
pub mod capture;

/// Injected time source
pub mod clock;

/// Environment-driven settings
pub mod config;

/// Enrollment upload packaging
pub mod enrollment;

/// Domain errors
pub mod errors;

/// Order workflow orchestration
pub mod orders;

/// Backend collaborator interfaces
pub mod ports;

pub use errors::{DeviceFault, Error, Result};
