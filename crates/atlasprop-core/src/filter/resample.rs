//! Resample filter.
//!
//! Resamples a volume onto a reference grid through a transform chain,
//! pulling every reference voxel back into the source volume and
//! interpolating there.

use burn::tensor::Tensor;
use burn::tensor::backend::Backend;

use crate::error::{CoreError, Result};
use crate::interpolation::{Interpolation, Interpolator};
use crate::transform::affine::apply_matrix;
use crate::transform::{Transform, TransformChain};
use crate::volume::grid::{generate_slab_indices, slab_ranges};
use crate::volume::{LabelVolume, Mask, Volume};

/// Upper bound on reference voxels processed per slab.
pub const DEFAULT_SLAB_VOXELS: usize = 1 << 20;

/// Resample filter.
///
/// The chain maps `source → reference`; its pull-back takes reference
/// points to source points. Reference voxels whose source location falls
/// outside the source grid are set to zero.
///
/// When every link of the chain is affine, reference voxel indices are
/// mapped to source voxel indices with a single matrix composed in `f64`.
pub struct ResampleFilter<'a, B: Backend> {
    chain: &'a TransformChain<B>,
    interpolation: Interpolation,
    slab_voxels: usize,
}

impl<'a, B: Backend> ResampleFilter<'a, B> {
    /// Create a new resample filter.
    ///
    /// # Arguments
    /// * `chain` - Transform chain from the input frame to the reference frame
    /// * `interpolation` - Interpolation policy for sampling the input
    pub fn new(chain: &'a TransformChain<B>, interpolation: Interpolation) -> Self {
        Self {
            chain,
            interpolation,
            slab_voxels: DEFAULT_SLAB_VOXELS,
        }
    }

    /// Bound the number of reference voxels held in memory at once.
    pub fn with_slab_voxels(mut self, slab_voxels: usize) -> Self {
        self.slab_voxels = slab_voxels.max(1);
        self
    }

    /// Apply the filter to `input`, producing a volume on `reference`'s grid.
    ///
    /// # Errors
    /// `SpaceMismatch` when the chain does not start in the input's frame or
    /// does not end in the reference's frame.
    pub fn apply(&self, input: &Volume<B>, reference: &Volume<B>) -> Result<Volume<B>> {
        let source = self.chain.source();
        let target = self.chain.target();
        if source != input.space() {
            return Err(CoreError::space_mismatch(source, input.space()));
        }
        if target != reference.space() {
            return Err(CoreError::space_mismatch(target, reference.space()));
        }

        let device = input.device();
        let shape = reference.shape();
        // reference index -> source index, when the chain is affine
        let direct = self
            .chain
            .as_affine()
            .map(|affine| input.inverse_affine() * affine.matrix() * reference.affine());

        let slabs: Vec<Tensor<B, 1>> = slab_ranges(shape, self.slab_voxels)
            .into_iter()
            .map(|slices| {
                let indices = generate_slab_indices::<B>(shape, slices, &device);
                let source_indices = match &direct {
                    Some(matrix) => apply_matrix(matrix, indices),
                    None => {
                        let world = reference.index_to_world_tensor(indices);
                        input.world_to_index_tensor(self.chain.transform_points(world))
                    }
                };
                self.sample(input, source_indices)
            })
            .collect();

        let data = Tensor::cat(slabs, 0).reshape(shape);
        Ok(reference.with_data(data)?.with_units(input.units()))
    }

    fn sample(&self, input: &Volume<B>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let inside = inside_mask(&indices, input.shape());
        self.interpolation.interpolate(input.data(), indices) * inside
    }
}

/// 1.0 where an index `(x, y, z)` lies within half a voxel of the grid, else 0.0.
fn inside_mask<B: Backend>(indices: &Tensor<B, 2>, shape: [usize; 3]) -> Tensor<B, 1> {
    let n = indices.dims()[0];
    let extents = [shape[2], shape[1], shape[0]];
    let mut mask = Tensor::<B, 1>::ones([n], &indices.device());
    for (axis, extent) in extents.iter().enumerate() {
        let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
        let lower = coord.clone().greater_equal_elem(-0.5).float();
        let upper = coord.lower_elem(*extent as f64 - 0.5).float();
        mask = mask * lower * upper;
    }
    mask
}

/// Resample a volume onto `reference`'s grid through `chain`.
pub fn resample<B: Backend>(
    volume: &Volume<B>,
    reference: &Volume<B>,
    chain: &TransformChain<B>,
    interpolation: Interpolation,
) -> Result<Volume<B>> {
    ResampleFilter::new(chain, interpolation).apply(volume, reference)
}

/// Resample a label volume with nearest-neighbour interpolation.
///
/// Every output value is a label of the input or zero.
pub fn resample_labels<B: Backend>(
    labels: &LabelVolume<B>,
    reference: &Volume<B>,
    chain: &TransformChain<B>,
) -> Result<LabelVolume<B>> {
    let resampled = ResampleFilter::new(chain, Interpolation::Nearest).apply(labels.volume(), reference)?;
    Ok(LabelVolume::from_trusted(resampled))
}

/// Resample a mask with nearest-neighbour interpolation.
pub fn resample_mask<B: Backend>(
    mask: &Mask<B>,
    reference: &Volume<B>,
    chain: &TransformChain<B>,
) -> Result<Mask<B>> {
    let resampled = ResampleFilter::new(chain, Interpolation::Nearest).apply(mask.volume(), reference)?;
    Mask::binarize(&resampled)
}
