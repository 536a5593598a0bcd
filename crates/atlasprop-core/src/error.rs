//! Error types for core volume and transform operations.

use thiserror::Error;
use crate::space::SpaceId;

/// Main error type for core operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Two transforms, or a transform and a volume, disagree on a coordinate frame.
    #[error("Space mismatch: expected {expected}, found {found}")]
    SpaceMismatch {
        expected: SpaceId,
        found: SpaceId,
    },

    /// Volumes that must share one voxel grid do not.
    #[error("Grid mismatch: expected shape {expected:?}, got {actual:?}")]
    GridMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// An affine matrix has no inverse or a malformed homogeneous row.
    #[error("Singular affine: {0}")]
    SingularAffine(String),

    /// The transform has no analytic inverse.
    #[error("Transform {source_space} -> {target_space} is not invertible")]
    NotInvertible {
        source_space: SpaceId,
        target_space: SpaceId,
    },

    /// Voxel data violates the invariant of its volume kind.
    #[error("Invalid volume: {0}")]
    InvalidVolume(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a space mismatch error.
    pub fn space_mismatch(expected: &SpaceId, found: &SpaceId) -> Self {
        Self::SpaceMismatch {
            expected: expected.clone(),
            found: found.clone(),
        }
    }

    /// Create a grid mismatch error.
    pub fn grid_mismatch(expected: [usize; 3], actual: [usize; 3]) -> Self {
        Self::GridMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Create a singular affine error.
    pub fn singular_affine(msg: impl Into<String>) -> Self {
        Self::SingularAffine(msg.into())
    }

    /// Create an invalid volume error.
    pub fn invalid_volume(msg: impl Into<String>) -> Self {
        Self::InvalidVolume(msg.into())
    }

    /// Whether this error is a coordinate-frame mismatch.
    pub fn is_space_mismatch(&self) -> bool {
        matches!(self, Self::SpaceMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_mismatch_display() {
        let err = CoreError::space_mismatch(&SpaceId::new("atlas"), &SpaceId::new("t2"));
        assert_eq!(err.to_string(), "Space mismatch: expected atlas, found t2");
        assert!(err.is_space_mismatch());
    }

    #[test]
    fn test_grid_mismatch() {
        let err = CoreError::grid_mismatch([2, 2, 2], [2, 2, 3]);
        let err_str = err.to_string();
        assert!(err_str.contains("expected"));
        assert!(err_str.contains("[2, 2, 3]"));
        assert!(!err.is_space_mismatch());
    }
}
