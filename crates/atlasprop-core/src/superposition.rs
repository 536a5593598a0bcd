//! Lesion mask superposition.
//!
//! Restricts a label volume to the voxels of a mask, giving the labels each
//! lesion overlaps.

use burn::tensor::backend::Backend;

use crate::error::{CoreError, Result};
use crate::volume::{LabelVolume, Mask};

/// Labels inside the mask; zero elsewhere.
///
/// The result keeps the label volume's affine and frame.
///
/// # Errors
/// `SpaceMismatch` if mask and labels live in different frames,
/// `GridMismatch` if they sample different grids.
pub fn superpose<B: Backend>(mask: &Mask<B>, labels: &LabelVolume<B>) -> Result<LabelVolume<B>> {
    if mask.space() != labels.space() {
        return Err(CoreError::space_mismatch(labels.space(), mask.space()));
    }
    labels.volume().ensure_same_grid(mask.volume())?;
    let overlap = labels.volume().data().clone() * mask.volume().data().clone();
    Ok(LabelVolume::from_trusted(labels.volume().with_data(overlap)?))
}

/// Superpose one mask against several label volumes.
pub fn superpose_each<B: Backend>(mask: &Mask<B>, labels: &[&LabelVolume<B>]) -> Result<Vec<LabelVolume<B>>> {
    labels.iter().map(|l| superpose(mask, l)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::SpaceId;
    use crate::volume::Volume;
    use burn_ndarray::NdArray;
    use nalgebra::Matrix4;

    type TestBackend = NdArray<f32>;

    fn volume(values: Vec<f32>, space: &str) -> Volume<TestBackend> {
        let device = Default::default();
        let n = values.len();
        Volume::from_values(values, [1, 1, n], Matrix4::identity(), SpaceId::new(space), &device).unwrap()
    }

    #[test]
    fn test_superpose_keeps_labels_inside_mask() {
        let mask = Mask::binarize(&volume(vec![0.0, 1.0, 1.0, 0.0], "dti")).unwrap();
        let labels = LabelVolume::new(volume(vec![5.0, 6.0, 0.0, 7.0], "dti")).unwrap();
        let out = superpose(&mask, &labels).unwrap();
        assert_eq!(out.volume().values().unwrap(), vec![0.0, 6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_superpose_rejects_other_space() {
        let mask = Mask::binarize(&volume(vec![1.0, 1.0], "t2")).unwrap();
        let labels = LabelVolume::new(volume(vec![1.0, 2.0], "dti")).unwrap();
        assert!(superpose(&mask, &labels).unwrap_err().is_space_mismatch());
    }

    #[test]
    fn test_superpose_rejects_other_grid() {
        let mask = Mask::binarize(&volume(vec![1.0, 1.0, 1.0], "dti")).unwrap();
        let labels = LabelVolume::new(volume(vec![1.0, 2.0], "dti")).unwrap();
        assert!(matches!(superpose(&mask, &labels), Err(CoreError::GridMismatch { .. })));
    }
}
