//! Deformable transforms anchored to an affine.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use crate::error::Result;
use crate::space::SpaceId;
use super::affine::{apply_matrix, AffineTransform};
use super::displacement_field::DisplacementField;
use super::trait_::Transform;

/// Non-rigid transform: an anchor affine plus a residual displacement field.
///
/// The pull-back map is `p ↦ anchor · p + u(p)`, where `u` is sampled
/// trilinearly from the residual field. Deformable transforms have no
/// analytic inverse; mapping the other way needs its own registration.
#[derive(Debug, Clone)]
pub struct DeformableTransform<B: Backend> {
    anchor: AffineTransform,
    residual: DisplacementField<B>,
}

impl<B: Backend> DeformableTransform<B> {
    /// Create a deformable transform from its anchor and residual field.
    pub fn new(anchor: AffineTransform, residual: DisplacementField<B>) -> Self {
        Self { anchor, residual }
    }

    /// A deformable transform with a zero residual; equivalent to `anchor`.
    pub fn from_anchor(anchor: AffineTransform, shape: [usize; 3], grid: nalgebra::Matrix4<f64>, device: &B::Device) -> Result<Self> {
        Ok(Self::new(anchor, DisplacementField::zeros(shape, grid, device)?))
    }

    /// Convert a full displacement field `d`, where `p ↦ p + d(p)`, into
    /// residual form around `anchor`.
    ///
    /// This is the form `reg_transform -disp` writes for a `reg_f3d` result.
    pub fn from_displacement(anchor: AffineTransform, field: &DisplacementField<B>) -> Result<Self> {
        let points = field.grid_points();
        let anchored = apply_matrix(anchor.matrix(), points.clone());
        let residual = points + field.vectors() - anchored;
        let residual = DisplacementField::from_vectors(residual, field.shape(), *field.affine())?;
        Ok(Self::new(anchor, residual))
    }

    /// Full displacement field on the residual grid, the inverse of
    /// [`DeformableTransform::from_displacement`].
    pub fn to_displacement(&self) -> Result<DisplacementField<B>> {
        let points = self.residual.grid_points();
        let anchored = apply_matrix(self.anchor.matrix(), points.clone());
        let full = anchored + self.residual.vectors() - points;
        DisplacementField::from_vectors(full, self.residual.shape(), *self.residual.affine())
    }

    pub fn anchor(&self) -> &AffineTransform {
        &self.anchor
    }

    pub fn residual(&self) -> &DisplacementField<B> {
        &self.residual
    }
}

impl<B: Backend> Transform<B> for DeformableTransform<B> {
    fn source(&self) -> &SpaceId {
        self.anchor.source()
    }

    fn target(&self) -> &SpaceId {
        self.anchor.target()
    }

    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        let displacement = self.residual.sample(points.clone());
        apply_matrix(self.anchor.matrix(), points) + displacement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use nalgebra::Matrix4;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_zero_residual_matches_anchor() {
        let device = Default::default();
        let anchor = AffineTransform::translation([3.0, 0.0, -1.0], SpaceId::new("a"), SpaceId::new("b"));
        let t = DeformableTransform::<TestBackend>::from_anchor(anchor, [2, 2, 2], Matrix4::identity(), &device).unwrap();
        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 1.0, 1.0]], &device);
        let out = t.transform_points(points).into_data().to_vec::<f32>().unwrap();
        assert_eq!(out, vec![4.0, 1.0, 0.0]);
    }

    #[test]
    fn test_displacement_conversion() {
        let device = Default::default();
        let anchor = AffineTransform::translation([1.0, 0.0, 0.0], SpaceId::new("a"), SpaceId::new("b"));
        let n = 2 * 2 * 2;
        // a full displacement of +3 in x: residual is +2 on top of the anchor shift
        let full = Tensor::<TestBackend, 2>::from_floats([[3.0, 0.0, 0.0]], &device).repeat(&[n, 1]);
        let field = DisplacementField::from_vectors(full, [2, 2, 2], Matrix4::identity()).unwrap();

        let t = DeformableTransform::from_displacement(anchor, &field).unwrap();
        let residual = t.residual().vectors().into_data().to_vec::<f32>().unwrap();
        assert!((residual[0] - 2.0).abs() < 1e-5);

        let points = Tensor::<TestBackend, 2>::from_floats([[0.5, 1.0, 0.0]], &device);
        let out = t.transform_points(points).into_data().to_vec::<f32>().unwrap();
        assert!((out[0] - 3.5).abs() < 1e-5);

        let back = t.to_displacement().unwrap().vectors().into_data().to_vec::<f32>().unwrap();
        assert!(back.chunks(3).all(|v| (v[0] - 3.0).abs() < 1e-5 && v[1].abs() < 1e-5));
    }
}
