//! Trilinear interpolation.

use burn::tensor::{Tensor, Int};
use burn::tensor::backend::Backend;
use super::trait_::Interpolator;

/// Trilinear interpolator for continuous-valued volumes.
///
/// Indices beyond the grid are clamped to the edge voxels.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [nz, ny, nx] = data.dims();
        let flat = data.clone().reshape([nz * ny * nx]);

        // Per axis, in (x, y, z) column order: the lower and upper neighbour
        // plus the weight of the upper one.
        let axes: Vec<Axis<B>> = [nx, ny, nz]
            .into_iter()
            .enumerate()
            .map(|(col, len)| Axis::new(indices.clone().narrow(1, col, 1).squeeze::<1>(1), len))
            .collect();
        let strides = [1, nx as i32, (nx * ny) as i32];

        let mut acc: Option<Tensor<B, 1>> = None;
        for corner in 0..8usize {
            let mut offset: Option<Tensor<B, 1, Int>> = None;
            let mut weight: Option<Tensor<B, 1>> = None;
            for (a, axis) in axes.iter().enumerate() {
                let upper = (corner >> a) & 1 == 1;
                let (index, w) = if upper {
                    (axis.hi.clone(), axis.frac.clone())
                } else {
                    (axis.lo.clone(), axis.frac.clone().neg() + 1.0)
                };
                let term = index * strides[a];
                offset = Some(match offset {
                    Some(o) => o + term,
                    None => term,
                });
                weight = Some(match weight {
                    Some(acc_w) => acc_w * w,
                    None => w,
                });
            }
            if let (Some(offset), Some(weight)) = (offset, weight) {
                let term = flat.clone().gather(0, offset) * weight;
                acc = Some(match acc {
                    Some(sum) => sum + term,
                    None => term,
                });
            }
        }
        acc.unwrap_or_else(|| Tensor::zeros([indices.dims()[0]], &indices.device()))
    }
}

/// Neighbour indices along one axis, clamped to `[0, len - 1]`.
struct Axis<B: Backend> {
    lo: Tensor<B, 1, Int>,
    hi: Tensor<B, 1, Int>,
    frac: Tensor<B, 1>,
}

impl<B: Backend> Axis<B> {
    fn new(coord: Tensor<B, 1>, len: usize) -> Self {
        let last = (len - 1) as f64;
        let floor = coord.clone().floor();
        Self {
            lo: floor.clone().clamp(0.0, last).int(),
            hi: (floor.clone() + 1.0).clamp(0.0, last).int(),
            frac: coord - floor,
        }
    }
}
