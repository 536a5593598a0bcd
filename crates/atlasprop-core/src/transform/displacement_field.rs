//! Dense displacement fields.
//!
//! A displacement field stores one world-space vector per voxel of its own
//! grid. Between grid points the vectors are sampled trilinearly.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use nalgebra::Matrix4;

use crate::error::{CoreError, Result};
use crate::interpolation::{Interpolator, LinearInterpolator};
use crate::volume::grid::generate_slab_indices;
use crate::volume::volume::validate_affine;
use super::affine::apply_matrix;

/// Dense vector field of shape `[3, Z, Y, X]` on a grid described by an affine.
///
/// Component 0 is the x displacement, 1 the y and 2 the z, in world units.
#[derive(Debug, Clone)]
pub struct DisplacementField<B: Backend> {
    data: Tensor<B, 4>,
    affine: Matrix4<f64>,
    inverse_affine: Matrix4<f64>,
}

impl<B: Backend> DisplacementField<B> {
    /// Create a new displacement field.
    ///
    /// # Arguments
    /// * `data` - Tensor of shape `[3, Z, Y, X]` holding displacement vectors
    /// * `affine` - Voxel index to world matrix of the field grid
    pub fn new(data: Tensor<B, 4>, affine: Matrix4<f64>) -> Result<Self> {
        let dims = data.dims();
        if dims[0] != 3 {
            return Err(CoreError::invalid_volume(format!(
                "displacement field needs 3 components, got {}",
                dims[0]
            )));
        }
        let inverse_affine = validate_affine(&affine)?;
        Ok(Self { data, affine, inverse_affine })
    }

    /// A field of zero vectors on the given grid.
    pub fn zeros(shape: [usize; 3], affine: Matrix4<f64>, device: &B::Device) -> Result<Self> {
        Self::new(Tensor::zeros([3, shape[0], shape[1], shape[2]], device), affine)
    }

    /// Build a field from per-voxel vectors `[N, 3]` in `[Z, Y, X]` order.
    pub fn from_vectors(vectors: Tensor<B, 2>, shape: [usize; 3], affine: Matrix4<f64>) -> Result<Self> {
        let n = shape[0] * shape[1] * shape[2];
        if vectors.dims() != [n, 3] {
            return Err(CoreError::invalid_volume(format!(
                "{:?} vectors for a {:?} grid",
                vectors.dims(),
                shape
            )));
        }
        let data = vectors.transpose().reshape([3, shape[0], shape[1], shape[2]]);
        Self::new(data, affine)
    }

    pub fn data(&self) -> &Tensor<B, 4> {
        &self.data
    }

    pub fn affine(&self) -> &Matrix4<f64> {
        &self.affine
    }

    /// Grid shape `[Z, Y, X]`.
    pub fn shape(&self) -> [usize; 3] {
        let [_, z, y, x] = self.data.dims();
        [z, y, x]
    }

    /// Per-voxel vectors as `[N, 3]`, voxels in `[Z, Y, X]` order.
    pub fn vectors(&self) -> Tensor<B, 2> {
        let [z, y, x] = self.shape();
        self.data.clone().reshape([3, z * y * x]).transpose()
    }

    /// World coordinates of every grid voxel as `[N, 3]`.
    pub fn grid_points(&self) -> Tensor<B, 2> {
        let shape = self.shape();
        let indices = generate_slab_indices::<B>(shape, 0..shape[0], &self.data.device());
        apply_matrix(&self.affine, indices)
    }

    /// Sample the field at world points `[N, 3]`, returning vectors `[N, 3]`.
    ///
    /// Points outside the grid take the vector of the nearest edge voxel.
    pub fn sample(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let [z, y, x] = self.shape();
        let indices = apply_matrix(&self.inverse_affine, points);
        let components: Vec<Tensor<B, 2>> = (0..3)
            .map(|c| {
                let component = self.data.clone().narrow(0, c, 1).reshape([z, y, x]);
                LinearInterpolator
                    .interpolate(&component, indices.clone())
                    .unsqueeze_dim(1)
            })
            .collect();
        Tensor::cat(components, 1)
    }
}
