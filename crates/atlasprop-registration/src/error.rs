//! Error types for registration operations.

use std::path::Path;
use thiserror::Error;
use atlasprop_core::CoreError;
use atlasprop_io::IoFailure;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The external registration did not produce a result for this pair.
    #[error("Registration of {moving} onto {fixed} failed: {reason}")]
    RegistrationFailure {
        fixed: String,
        moving: String,
        reason: String,
    },

    /// Invalid registration parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Transform or volume invariant violated.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Input or output file could not be read or written.
    #[error(transparent)]
    Io(#[from] IoFailure),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create a registration failure naming the fixed/moving pair.
    pub fn failure(fixed: &Path, moving: &Path, reason: impl Into<String>) -> Self {
        Self::RegistrationFailure {
            fixed: fixed.display().to_string(),
            moving: moving.display().to_string(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }
}
