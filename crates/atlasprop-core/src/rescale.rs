//! Coordinate rescaling for external tractography tools.
//!
//! DSI Studio expects rodent volumes with voxel sizes scaled up to human
//! range and the slice axis reversed. The rescaler applies both to a whole
//! set of volumes at once, so no member of a set can end up flipped while
//! another is not.

use burn::tensor::backend::Backend;
use serde::{Serialize, Deserialize};

use crate::error::{CoreError, Result};
use crate::volume::{Axis, Volume};

/// Voxel-size scale factor plus an optional axis flip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateRescaler {
    pub factor: f64,
    pub flip: Option<Axis>,
}

impl CoordinateRescaler {
    /// Preset for DSI Studio: tenfold voxel size, flipped along the slice axis.
    pub const DSI_STUDIO: Self = Self {
        factor: 10.0,
        flip: Some(Axis::Z),
    };

    pub fn new(factor: f64, flip: Option<Axis>) -> Self {
        Self { factor, flip }
    }

    /// Rescale (and flip) every volume of a set sharing one grid.
    ///
    /// Either every volume is returned transformed, or an error and none.
    ///
    /// # Errors
    /// `GridMismatch` if the volumes do not share a grid, `InvalidVolume`
    /// for a non-positive factor.
    pub fn apply<B: Backend>(&self, volumes: Vec<Volume<B>>) -> Result<Vec<Volume<B>>> {
        if let Some(first) = volumes.first() {
            for other in &volumes[1..] {
                if !first.same_grid(other) {
                    return Err(CoreError::grid_mismatch(first.shape(), other.shape()));
                }
            }
        }
        volumes
            .iter()
            .map(|volume| {
                let scaled = volume.rescaled(self.factor)?;
                Ok(match self.flip {
                    Some(axis) => scaled.flipped(axis),
                    None => scaled,
                })
            })
            .collect()
    }

    /// Undo the voxel-size scaling of a single volume; no flip is applied.
    pub fn unscale<B: Backend>(&self, volume: &Volume<B>) -> Result<Volume<B>> {
        volume.rescaled(1.0 / self.factor)
    }
}
