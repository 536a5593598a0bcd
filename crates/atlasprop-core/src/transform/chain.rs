//! Transform chains.
//!
//! A chain is an ordered list of links where each link's target frame is
//! the next link's source frame. Its pull-back map applies the links in
//! reverse order, so a whole chain can be resampled through in one pass.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use crate::error::{CoreError, Result};
use crate::space::SpaceId;
use super::affine::AffineTransform;
use super::deformable::DeformableTransform;
use super::trait_::Transform;

/// A single link of a transform chain.
#[derive(Debug, Clone)]
pub enum SpatialTransform<B: Backend> {
    Affine(AffineTransform),
    Deformable(DeformableTransform<B>),
}

impl<B: Backend> SpatialTransform<B> {
    /// Inverse of this link.
    ///
    /// # Errors
    /// `NotInvertible` for deformable links; `SingularAffine` for a
    /// degenerate affine.
    pub fn inverse(&self) -> Result<Self> {
        match self {
            Self::Affine(affine) => Ok(Self::Affine(affine.inverse()?)),
            Self::Deformable(deformable) => Err(CoreError::NotInvertible {
                source_space: deformable.source().clone(),
                target_space: deformable.target().clone(),
            }),
        }
    }

    pub fn as_affine(&self) -> Option<&AffineTransform> {
        match self {
            Self::Affine(affine) => Some(affine),
            Self::Deformable(_) => None,
        }
    }

    pub fn as_deformable(&self) -> Option<&DeformableTransform<B>> {
        match self {
            Self::Affine(_) => None,
            Self::Deformable(deformable) => Some(deformable),
        }
    }

    pub fn is_deformable(&self) -> bool {
        matches!(self, Self::Deformable(_))
    }
}

impl<B: Backend> Transform<B> for SpatialTransform<B> {
    fn source(&self) -> &SpaceId {
        match self {
            Self::Affine(affine) => affine.source(),
            Self::Deformable(deformable) => deformable.source(),
        }
    }

    fn target(&self) -> &SpaceId {
        match self {
            Self::Affine(affine) => affine.target(),
            Self::Deformable(deformable) => deformable.target(),
        }
    }

    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Self::Affine(affine) => Transform::<B>::transform_points(affine, points),
            Self::Deformable(deformable) => deformable.transform_points(points),
        }
    }
}

impl<B: Backend> From<AffineTransform> for SpatialTransform<B> {
    fn from(affine: AffineTransform) -> Self {
        Self::Affine(affine)
    }
}

impl<B: Backend> From<DeformableTransform<B>> for SpatialTransform<B> {
    fn from(deformable: DeformableTransform<B>) -> Self {
        Self::Deformable(deformable)
    }
}

/// Ordered, frame-checked sequence of transforms.
///
/// # Examples
/// ```rust
/// use atlasprop_core::{AffineTransform, SpaceId, TransformChain, Transform};
/// use burn_ndarray::NdArray;
///
/// let atlas_to_t2 = AffineTransform::translation([1.0, 0.0, 0.0], SpaceId::atlas(), SpaceId::new("t2"));
/// let t2_to_dti = AffineTransform::identity(SpaceId::new("t2"));
/// let chain = TransformChain::<NdArray<f32>>::new(atlas_to_t2).then(t2_to_dti).unwrap();
/// assert_eq!(chain.target(), &SpaceId::new("t2"));
/// ```
#[derive(Debug, Clone)]
pub struct TransformChain<B: Backend> {
    links: Vec<SpatialTransform<B>>,
}

impl<B: Backend> TransformChain<B> {
    /// Start a chain from its first link.
    pub fn new(first: impl Into<SpatialTransform<B>>) -> Self {
        Self { links: vec![first.into()] }
    }

    /// Append a link.
    ///
    /// # Errors
    /// `SpaceMismatch` unless the link's source is the chain's current target.
    pub fn push(&mut self, link: impl Into<SpatialTransform<B>>) -> Result<()> {
        let link = link.into();
        if link.source() != self.target() {
            return Err(CoreError::space_mismatch(self.target(), link.source()));
        }
        self.links.push(link);
        Ok(())
    }

    /// Builder form of [`TransformChain::push`].
    pub fn then(mut self, link: impl Into<SpatialTransform<B>>) -> Result<Self> {
        self.push(link)?;
        Ok(self)
    }

    /// Append every link of `other`.
    pub fn extend(mut self, other: TransformChain<B>) -> Result<Self> {
        for link in other.links {
            self.push(link)?;
        }
        Ok(self)
    }

    pub fn links(&self) -> &[SpatialTransform<B>] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Collapse every run of consecutive affine links into one affine.
    pub fn composed(&self) -> Self {
        let mut links: Vec<SpatialTransform<B>> = Vec::with_capacity(self.links.len());
        for link in &self.links {
            let merged = match (links.last(), link) {
                (Some(SpatialTransform::Affine(prev)), SpatialTransform::Affine(next)) => Some(prev.combine(next)),
                _ => None,
            };
            match merged {
                Some(affine) => {
                    links.pop();
                    links.push(SpatialTransform::Affine(affine));
                }
                None => links.push(link.clone()),
            }
        }
        Self { links }
    }

    /// The single affine equivalent to this chain, if every link is affine.
    pub fn as_affine(&self) -> Option<AffineTransform> {
        let composed = self.composed();
        match composed.links.as_slice() {
            [SpatialTransform::Affine(affine)] => Some(affine.clone()),
            _ => None,
        }
    }
}

impl<B: Backend> Transform<B> for TransformChain<B> {
    fn source(&self) -> &SpaceId {
        self.links[0].source()
    }

    fn target(&self) -> &SpaceId {
        self.links[self.links.len() - 1].target()
    }

    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        self.links
            .iter()
            .rev()
            .fold(points, |points, link| link.transform_points(points))
    }
}

impl<B: Backend> From<SpatialTransform<B>> for TransformChain<B> {
    fn from(link: SpatialTransform<B>) -> Self {
        Self::new(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use nalgebra::Matrix4;

    type TestBackend = NdArray<f32>;

    fn shift(x: f64, from: &str, to: &str) -> AffineTransform {
        AffineTransform::translation([x, 0.0, 0.0], SpaceId::new(from), SpaceId::new(to))
    }

    #[test]
    fn test_push_rejects_incompatible_spaces() {
        let mut chain = TransformChain::<TestBackend>::new(shift(1.0, "a", "b"));
        let err = chain.push(shift(1.0, "c", "d")).unwrap_err();
        assert_eq!(
            err,
            CoreError::SpaceMismatch { expected: SpaceId::new("b"), found: SpaceId::new("c") }
        );
        assert_eq!(chain.len(), 1);
    }

    #[test]
    fn test_composed_collapses_affine_runs() {
        let device = Default::default();
        let deformable = DeformableTransform::<TestBackend>::from_anchor(
            shift(0.5, "b", "c"),
            [2, 2, 2],
            Matrix4::identity(),
            &device,
        )
        .unwrap();
        let chain = TransformChain::<TestBackend>::new(shift(1.0, "a", "b"))
            .then(deformable)
            .unwrap()
            .then(shift(2.0, "c", "d"))
            .unwrap()
            .then(shift(3.0, "d", "e"))
            .unwrap();

        let composed = chain.composed();
        assert_eq!(composed.len(), 3);
        assert_eq!(composed.links()[2].as_affine().unwrap().matrix()[(0, 3)], 5.0);
        assert!(chain.as_affine().is_none());
    }

    #[test]
    fn test_chain_points_match_composition() {
        let device = Default::default();
        let mut scale = Matrix4::identity();
        scale[(0, 0)] = 2.0;
        let first = shift(1.0, "a", "b");
        let second = AffineTransform::new(scale, SpaceId::new("b"), SpaceId::new("c")).unwrap();
        let composite = first.then(&second).unwrap();
        let chain = TransformChain::<TestBackend>::new(first).then(second).unwrap();

        let points = Tensor::<TestBackend, 2>::from_floats([[3.0, 1.0, 2.0]], &device);
        let via_chain = chain.transform_points(points.clone()).into_data().to_vec::<f32>().unwrap();
        let via_matrix = Transform::<TestBackend>::transform_points(&composite, points)
            .into_data()
            .to_vec::<f32>()
            .unwrap();
        assert_eq!(via_chain, via_matrix);
        assert_eq!(via_chain, vec![7.0, 1.0, 2.0]);
    }

    #[test]
    fn test_deformable_link_refuses_inversion() {
        let device = Default::default();
        let link: SpatialTransform<TestBackend> = DeformableTransform::from_anchor(
            shift(1.0, "a", "b"),
            [1, 1, 1],
            Matrix4::identity(),
            &device,
        )
        .unwrap()
        .into();
        assert!(matches!(link.inverse(), Err(CoreError::NotInvertible { .. })));

        let affine: SpatialTransform<TestBackend> = shift(1.0, "a", "b").into();
        assert_eq!(affine.inverse().unwrap().source(), &SpaceId::new("b"));
    }
}
