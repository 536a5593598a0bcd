//! Error taxonomy of the orchestrators.

use thiserror::Error;
use atlasprop_core::CoreError;
use atlasprop_io::IoFailure;
use atlasprop_registration::RegistrationError;

/// Coarse classification used for reporting and batch policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Incompatible coordinate frames or voxel grids; fatal to the chain.
    SpaceMismatch,
    /// External registration failed; fatal to the subject.
    RegistrationFailure,
    /// Missing or corrupt file; fatal to the subject.
    IoFailure,
    /// Absent optional input; the run continues and records a skipped step.
    MissingOptionalInput,
    /// Malformed configuration or volume contents.
    InvalidInput,
}

impl ErrorKind {
    /// Whether a run can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MissingOptionalInput)
    }
}

/// Main error type for pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Io(#[from] IoFailure),

    /// An optional input is absent.
    #[error("Missing optional input {what}: {reason}")]
    MissingOptionalInput {
        what: String,
        reason: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Create a missing optional input error.
    pub fn missing_optional(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingOptionalInput {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Registration(e) => registration_kind(e),
            Self::Core(e) => core_kind(e),
            Self::Io(_) => ErrorKind::IoFailure,
            Self::MissingOptionalInput { .. } => ErrorKind::MissingOptionalInput,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }
}

fn core_kind(error: &CoreError) -> ErrorKind {
    match error {
        CoreError::SpaceMismatch { .. } | CoreError::GridMismatch { .. } => ErrorKind::SpaceMismatch,
        _ => ErrorKind::InvalidInput,
    }
}

fn registration_kind(error: &RegistrationError) -> ErrorKind {
    match error {
        RegistrationError::RegistrationFailure { .. } => ErrorKind::RegistrationFailure,
        RegistrationError::InvalidConfiguration(_) => ErrorKind::InvalidInput,
        RegistrationError::Core(e) => core_kind(e),
        RegistrationError::Io(_) => ErrorKind::IoFailure,
    }
}

/// A failure attributed to one subject and stage.
#[derive(Error, Debug)]
#[error("{subject}: stage {stage} failed: {error}")]
pub struct StageError {
    pub subject: String,
    pub stage: String,
    #[source]
    pub error: PipelineError,
}

impl StageError {
    pub fn new(subject: impl Into<String>, stage: impl Into<String>, error: impl Into<PipelineError>) -> Self {
        Self {
            subject: subject.into(),
            stage: stage.into(),
            error: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use atlasprop_core::SpaceId;

    #[test]
    fn test_kind_sees_through_wrappers() {
        let reg = RegistrationError::failure(Path::new("dti.nii.gz"), Path::new("t2.nii.gz"), "no convergence");
        assert_eq!(PipelineError::from(reg).kind(), ErrorKind::RegistrationFailure);

        let nested: RegistrationError = CoreError::space_mismatch(&SpaceId::atlas(), &SpaceId::new("t2")).into();
        assert_eq!(PipelineError::from(nested).kind(), ErrorKind::SpaceMismatch);

        let io = IoFailure::new("missing.nii.gz", std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(PipelineError::from(io).kind(), ErrorKind::IoFailure);

        let missing = PipelineError::missing_optional("lesion mask", "none in session");
        assert!(missing.kind().is_recoverable());
    }

    #[test]
    fn test_stage_error_names_subject_and_stage() {
        let err = StageError::new("GV_T3_12_1", "dti_rigid", PipelineError::invalid_input("empty volume"));
        let msg = err.to_string();
        assert!(msg.contains("GV_T3_12_1"));
        assert!(msg.contains("dti_rigid"));
        assert!(msg.contains("empty volume"));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}
