//! Nearest neighbor interpolation.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use super::trait_::Interpolator;

/// Nearest neighbor interpolator.
///
/// Returns the value of the closest voxel, so the output only ever holds
/// values present in the input. Label volumes and masks are resampled with
/// this interpolator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighborInterpolator;

impl NearestNeighborInterpolator {
    pub fn new() -> Self {
        Self
    }
}

impl<B: Backend> Interpolator<B> for NearestNeighborInterpolator {
    fn interpolate(&self, data: &Tensor<B, 3>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let [d0, d1, d2] = data.dims(); // Z, Y, X
        let n = indices.dims()[0];

        // indices: (x, y, z)
        let x = indices.clone().slice([0..n, 0..1]).squeeze::<1>(1);
        let y = indices.clone().slice([0..n, 1..2]).squeeze::<1>(1);
        let z = indices.slice([0..n, 2..3]).squeeze::<1>(1);

        // Round to nearest integer and clamp
        let x_i = x.round().clamp(0.0, (d2 - 1) as f64).int();
        let y_i = y.round().clamp(0.0, (d1 - 1) as f64).int();
        let z_i = z.round().clamp(0.0, (d0 - 1) as f64).int();

        let stride_z = (d1 * d2) as i32;
        let stride_y = d2 as i32;

        let idx = z_i * stride_z + y_i * stride_y + x_i;
        let flat_data = data.clone().reshape([d0 * d1 * d2]);
        flat_data.gather(0, idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_nearest_picks_closest_voxel() {
        let device = Default::default();
        let data = Tensor::<TestBackend, 3>::from_floats([[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0], [7.0, 8.0]]], &device);
        let indices = Tensor::<TestBackend, 2>::from_floats([[0.4, 0.6, 0.0], [0.9, 1.2, 0.7], [-3.0, 0.0, 0.0]], &device);
        let out = NearestNeighborInterpolator.interpolate(&data, indices).into_data().to_vec::<f32>().unwrap();
        assert_eq!(out, vec![3.0, 8.0, 1.0]);
    }
}
