//! Transform trait for spatial coordinate transformations.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;
use crate::space::SpaceId;

/// A spatial transform from a source frame to a target frame.
///
/// Transforms store the *pull-back* map: [`Transform::transform_points`]
/// takes points in the target frame and returns where they come from in the
/// source frame.
///
/// # Type Parameters
/// * `B` - The Burn backend
pub trait Transform<B: Backend> {
    /// Frame the transform maps from.
    fn source(&self) -> &SpaceId;

    /// Frame the transform maps into.
    fn target(&self) -> &SpaceId;

    /// Pull a batch of target-frame points back into the source frame.
    ///
    /// # Arguments
    /// * `points` - Tensor of shape `[Batch, 3]` of world points in the target frame
    ///
    /// # Returns
    /// Tensor of shape `[Batch, 3]` of world points in the source frame
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}
