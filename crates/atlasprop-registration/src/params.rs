//! Deformable registration parameters.

use serde::{Serialize, Deserialize};
use crate::error::{RegistrationError, Result};

/// Default weight of the Jacobian-determinant penalty.
pub const DEFAULT_JACOBIAN_PENALTY: f64 = 0.3;

/// Regularization level of the deformable registration.
///
/// Each level fixes the control-point spacing along x, y and z (in voxels);
/// coarser levels suit noisier or more deformed scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum SmoothnessLevel {
    One,
    Two,
    #[default]
    Three,
    Four,
}

impl SmoothnessLevel {
    /// Control-point spacing `[sx, sy, sz]`.
    pub fn spacing(&self) -> [u32; 3] {
        match self {
            Self::One => [1, 1, 2],
            Self::Two => [2, 2, 2],
            Self::Three => [3, 3, 3],
            Self::Four => [5, 5, 5],
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
        }
    }
}

impl TryFrom<u8> for SmoothnessLevel {
    type Error = RegistrationError;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            3 => Ok(Self::Three),
            4 => Ok(Self::Four),
            other => Err(RegistrationError::invalid_configuration(format!(
                "smoothness level must be 1 to 4, got {}",
                other
            ))),
        }
    }
}

impl From<SmoothnessLevel> for u8 {
    fn from(level: SmoothnessLevel) -> u8 {
        level.level()
    }
}

/// Parameters of a deformable registration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeformableParams {
    pub smoothness: SmoothnessLevel,
    pub jacobian_penalty: f64,
}

impl Default for DeformableParams {
    fn default() -> Self {
        Self {
            smoothness: SmoothnessLevel::default(),
            jacobian_penalty: DEFAULT_JACOBIAN_PENALTY,
        }
    }
}

impl DeformableParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the smoothness level.
    pub fn with_smoothness(mut self, smoothness: SmoothnessLevel) -> Self {
        self.smoothness = smoothness;
        self
    }

    /// Set the Jacobian-determinant penalty weight.
    pub fn with_jacobian_penalty(mut self, penalty: f64) -> Self {
        self.jacobian_penalty = penalty;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.jacobian_penalty.is_finite() || self.jacobian_penalty < 0.0 {
            return Err(RegistrationError::invalid_configuration(format!(
                "jacobian penalty must be non-negative, got {}",
                self.jacobian_penalty
            )));
        }
        Ok(())
    }
}
