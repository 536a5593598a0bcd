use std::ops::Range;
use burn::tensor::{Tensor, TensorData, Shape};
use burn::tensor::backend::Backend;

/// Generate continuous indices `(x, y, z)` for a range of Z-slices.
///
/// Returns a tensor of shape `[N, 3]` where N is `slices.len() * Y * X`,
/// ordered like the `[Z, Y, X]` data layout.
///
/// # Arguments
/// * `shape` - The volume shape `[Z, Y, X]`
/// * `slices` - The Z-slices to cover
/// * `device` - The device to create the tensor on
pub fn generate_slab_indices<B: Backend>(
    shape: [usize; 3],
    slices: Range<usize>,
    device: &B::Device,
) -> Tensor<B, 2> {
    let h = shape[1];
    let w = shape[2];
    let total = slices.len() * h * w;

    let mut grid = Vec::with_capacity(total * 3);
    for z in slices {
        for y in 0..h {
            for x in 0..w {
                grid.push(x as f32);
                grid.push(y as f32);
                grid.push(z as f32);
            }
        }
    }

    Tensor::<B, 1>::from_data(TensorData::new(grid, Shape::new([total * 3])), device)
        .reshape([total, 3])
}

/// Split `depth` Z-slices into slabs holding at most `max_voxels` voxels each.
///
/// Every slab holds at least one slice.
pub fn slab_ranges(shape: [usize; 3], max_voxels: usize) -> Vec<Range<usize>> {
    let slice_voxels = (shape[1] * shape[2]).max(1);
    let step = (max_voxels / slice_voxels).max(1);
    (0..shape[0])
        .step_by(step)
        .map(|start| start..(start + step).min(shape[0]))
        .collect()
}
