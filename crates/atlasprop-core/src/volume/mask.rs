//! Binary region masks.

use burn::tensor::ElementConversion;
use burn::tensor::backend::Backend;

use crate::error::Result;
use crate::space::SpaceId;
use super::volume::Volume;

/// A {0, 1} volume marking a region such as a lesion.
#[derive(Debug, Clone)]
pub struct Mask<B: Backend> {
    volume: Volume<B>,
}

impl<B: Backend> Mask<B> {
    /// Binarize a volume: values `> 0` become 1, everything else 0.
    pub fn binarize(volume: &Volume<B>) -> Result<Self> {
        let binary = volume.data().clone().greater_elem(0.0).float();
        Ok(Self { volume: volume.with_data(binary)? })
    }

    pub fn volume(&self) -> &Volume<B> {
        &self.volume
    }

    pub fn into_volume(self) -> Volume<B> {
        self.volume
    }

    pub fn space(&self) -> &SpaceId {
        self.volume.space()
    }

    /// Number of voxels inside the mask.
    pub fn voxel_count(&self) -> usize {
        let total: f64 = self.volume.data().clone().sum().into_scalar().elem();
        total.round() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.voxel_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use nalgebra::Matrix4;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_binarize() {
        let device = Default::default();
        let values = vec![0.0, 0.2, -3.0, 255.0, 1.0, 0.0];
        let volume = Volume::<TestBackend>::from_values(values, [1, 2, 3], Matrix4::identity(), SpaceId::atlas(), &device).unwrap();
        let mask = Mask::binarize(&volume).unwrap();
        assert_eq!(mask.volume().values().unwrap(), vec![0.0, 1.0, 0.0, 1.0, 1.0, 0.0]);
        assert_eq!(mask.voxel_count(), 3);
        assert!(!mask.is_empty());
    }
}
