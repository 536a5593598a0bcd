//! Integer label volumes.

use std::collections::BTreeSet;
use burn::tensor::{Tensor, TensorData, Shape};
use burn::tensor::backend::Backend;

use crate::error::{CoreError, Result};
use crate::space::SpaceId;
use super::volume::Volume;

/// A volume of non-negative integer region labels; zero is background.
///
/// Only nearest-neighbour resampling is offered for label volumes, so label
/// values are never blended.
#[derive(Debug, Clone)]
pub struct LabelVolume<B: Backend> {
    volume: Volume<B>,
}

impl<B: Backend> LabelVolume<B> {
    /// Wrap a volume, checking every voxel is a non-negative integer.
    pub fn new(volume: Volume<B>) -> Result<Self> {
        let values = volume.values()?;
        if let Some(bad) = values.iter().find(|v| !is_label(**v)) {
            return Err(CoreError::invalid_volume(format!(
                "label volume in {} holds non-label value {}",
                volume.space(),
                bad
            )));
        }
        Ok(Self { volume })
    }

    /// Wrap a volume whose values are already known to be labels.
    pub(crate) fn from_trusted(volume: Volume<B>) -> Self {
        Self { volume }
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

    pub fn shape(&self) -> [usize; 3] {
        self.volume.shape()
    }

    /// Distinct label values, background included.
    pub fn labels(&self) -> Result<BTreeSet<u32>> {
        Ok(self.volume.values()?.into_iter().map(|v| v as u32).collect())
    }

    /// Repair a continuously interpolated label volume.
    ///
    /// Negative values are clamped to zero, values are rounded, and every
    /// voxel is snapped to the closest label present in `reference`.
    pub fn restore_identity(volume: Volume<B>, reference: &LabelVolume<B>) -> Result<Self> {
        let palette: Vec<u32> = reference.labels()?.into_iter().collect();
        if palette.is_empty() {
            return Err(CoreError::invalid_volume("reference label volume is empty"));
        }
        let restored: Vec<f32> = volume
            .values()?
            .into_iter()
            .map(|v| nearest_label(&palette, v.max(0.0).round() as u32) as f32)
            .collect();
        let data = Tensor::<B, 3>::from_data(
            TensorData::new(restored, Shape::new(volume.shape())),
            &volume.device(),
        );
        Ok(Self { volume: volume.with_data(data)? })
    }
}

fn is_label(v: f32) -> bool {
    v.is_finite() && v >= 0.0 && v.fract() == 0.0
}

/// Closest palette entry; ties go to the smaller label.
fn nearest_label(palette: &[u32], value: u32) -> u32 {
    match palette.binary_search(&value) {
        Ok(_) => value,
        Err(0) => palette[0],
        Err(i) if i == palette.len() => palette[i - 1],
        Err(i) => {
            let (lo, hi) = (palette[i - 1], palette[i]);
            if value - lo <= hi - value { lo } else { hi }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use nalgebra::Matrix4;

    type TestBackend = NdArray<f32>;

    fn volume(values: Vec<f32>) -> Volume<TestBackend> {
        let device = Default::default();
        let n = values.len();
        Volume::from_values(values, [1, 1, n], Matrix4::identity(), SpaceId::atlas(), &device).unwrap()
    }

    #[test]
    fn test_rejects_fractional_labels() {
        assert!(LabelVolume::new(volume(vec![0.0, 1.5])).is_err());
        assert!(LabelVolume::new(volume(vec![0.0, -1.0])).is_err());
        assert!(LabelVolume::new(volume(vec![0.0, 3.0, 2001.0])).is_ok());
    }

    #[test]
    fn test_labels() {
        let labels = LabelVolume::new(volume(vec![0.0, 3.0, 3.0, 7.0])).unwrap();
        let set: Vec<u32> = labels.labels().unwrap().into_iter().collect();
        assert_eq!(set, vec![0, 3, 7]);
    }

    #[test]
    fn test_restore_identity_snaps_to_reference() {
        let reference = LabelVolume::new(volume(vec![0.0, 10.0, 2010.0])).unwrap();
        let blurred = volume(vec![-0.3, 4.6, 9.2, 1500.0, 2009.7]);
        let restored = LabelVolume::restore_identity(blurred, &reference).unwrap();
        assert_eq!(
            restored.volume().values().unwrap(),
            vec![0.0, 0.0, 10.0, 2010.0, 2010.0]
        );
    }

    #[test]
    fn test_nearest_label_ties() {
        assert_eq!(nearest_label(&[2, 4], 3), 2);
        assert_eq!(nearest_label(&[2, 4], 9), 4);
        assert_eq!(nearest_label(&[2, 4], 0), 2);
    }
}
