//! Affine transform between two coordinate frames.

use burn::tensor::{Tensor, TensorData, Shape};
use burn::tensor::backend::Backend;
use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};
use serde::{Serialize, Deserialize};

use crate::error::{CoreError, Result};
use crate::space::SpaceId;
use crate::volume::volume::validate_affine;
use super::trait_::Transform;

/// Affine transform `source → target`.
///
/// The 4×4 matrix maps target world points to source world points
/// (`p_source = M · p_target`), the convention NiftyReg uses for the
/// matrices `reg_aladin` writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    matrix: Matrix4<f64>,
    source: SpaceId,
    target: SpaceId,
}

impl AffineTransform {
    /// Create a new affine transform.
    ///
    /// # Arguments
    /// * `matrix` - Pull-back matrix from target points to source points
    /// * `source` - Frame the transform maps from
    /// * `target` - Frame the transform maps into
    ///
    /// # Errors
    /// `SingularAffine` if the matrix is not invertible or not homogeneous.
    pub fn new(matrix: Matrix4<f64>, source: SpaceId, target: SpaceId) -> Result<Self> {
        validate_affine(&matrix)?;
        Ok(Self { matrix, source, target })
    }

    /// Identity within a single frame.
    pub fn identity(space: SpaceId) -> Self {
        Self {
            matrix: Matrix4::identity(),
            source: space.clone(),
            target: space,
        }
    }

    /// Pure translation: each target point is pulled from `point + offset`.
    pub fn translation(offset: [f64; 3], source: SpaceId, target: SpaceId) -> Self {
        Self {
            matrix: Matrix4::new_translation(&Vector3::from(offset)),
            source,
            target,
        }
    }

    pub fn matrix(&self) -> &Matrix4<f64> {
        &self.matrix
    }

    pub fn source(&self) -> &SpaceId {
        &self.source
    }

    pub fn target(&self) -> &SpaceId {
        &self.target
    }

    /// Apply `self`, then `next`.
    ///
    /// # Errors
    /// `SpaceMismatch` unless `self.target() == next.source()`.
    pub fn then(&self, next: &AffineTransform) -> Result<Self> {
        if self.target != next.source {
            return Err(CoreError::space_mismatch(&self.target, &next.source));
        }
        Ok(self.combine(next))
    }

    /// Composition without the frame check; callers have already verified it.
    pub(crate) fn combine(&self, next: &AffineTransform) -> Self {
        Self {
            matrix: self.matrix * next.matrix,
            source: self.source.clone(),
            target: next.target.clone(),
        }
    }

    /// Analytic inverse `target → source`.
    pub fn inverse(&self) -> Result<Self> {
        let matrix = self
            .matrix
            .try_inverse()
            .ok_or_else(|| CoreError::singular_affine(format!("{} -> {} has no inverse", self.source, self.target)))?;
        Ok(Self {
            matrix,
            source: self.target.clone(),
            target: self.source.clone(),
        })
    }

    /// Right-multiply by `diag(f, f, f, 1)`.
    ///
    /// Scales the linear block by `factor`; the translation column and the
    /// homogeneous row are unchanged.
    pub fn rescaled(&self, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(CoreError::singular_affine(format!("rescale factor {} is not positive", factor)));
        }
        let scale = Matrix4::new_nonuniform_scaling(&Vector3::new(factor, factor, factor));
        Ok(Self {
            matrix: self.matrix * scale,
            source: self.source.clone(),
            target: self.target.clone(),
        })
    }

    /// Whether the linear block is orthonormal within `tolerance`.
    pub fn is_rigid(&self, tolerance: f64) -> bool {
        let linear: Matrix3<f64> = self.matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let gram = linear.transpose() * linear;
        (gram - Matrix3::identity()).abs().max() <= tolerance
    }

    /// Pull a single target point back to the source frame.
    pub fn map_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        let h = self.matrix * Vector4::new(point.x, point.y, point.z, 1.0);
        Vector3::new(h.x, h.y, h.z)
    }
}

impl<B: Backend> Transform<B> for AffineTransform {
    fn source(&self) -> &SpaceId {
        &self.source
    }

    fn target(&self) -> &SpaceId {
        &self.target
    }

    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        apply_matrix(&self.matrix, points)
    }
}

/// Apply a homogeneous 4×4 matrix to a batch of points `[N, 3]`.
pub fn apply_matrix<B: Backend>(matrix: &Matrix4<f64>, points: Tensor<B, 2>) -> Tensor<B, 2> {
    let device = points.device();

    // points: [N, 3] row vectors, so multiply by the transposed linear block
    let mut linear_t = Vec::with_capacity(9);
    for row in 0..3 {
        for col in 0..3 {
            linear_t.push(matrix[(col, row)] as f32);
        }
    }
    let linear_t = Tensor::<B, 2>::from_data(TensorData::new(linear_t, Shape::new([3, 3])), &device);

    let offset = vec![matrix[(0, 3)] as f32, matrix[(1, 3)] as f32, matrix[(2, 3)] as f32];
    let offset = Tensor::<B, 2>::from_data(TensorData::new(offset, Shape::new([1, 3])), &device);

    points.matmul(linear_t) + offset
}
