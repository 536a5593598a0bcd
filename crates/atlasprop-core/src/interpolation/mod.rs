//! Interpolation methods for sampling volumes at continuous indices.

pub mod trait_;
pub mod nearest;
pub mod linear;

pub use trait_::Interpolator;
pub use nearest::NearestNeighborInterpolator;
pub use linear::LinearInterpolator;

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use serde::{Serialize, Deserialize};

/// Interpolation policy for a resampling call.
///
/// `Continuous` is trilinear and meant for intensity images; `Nearest` keeps
/// every output value equal to some input value and is the only policy label
/// volumes and masks are resampled with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interpolation {
    Continuous,
    Nearest,
}

impl Interpolation {
    /// NiftyReg `-inter` code for this policy.
    pub fn niftyreg_code(&self) -> u8 {
        match self {
            Self::Nearest => 0,
            Self::Continuous => 1,
        }
    }
}

impl<B: Backend> Interpolator<B> for Interpolation {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        match self {
            Self::Continuous => LinearInterpolator.interpolate(data, indices),
            Self::Nearest => NearestNeighborInterpolator.interpolate(data, indices),
        }
    }
}
