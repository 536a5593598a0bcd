//! Contract with the external registration tool.

use std::path::{Path, PathBuf};
use burn::tensor::backend::Backend;

use atlasprop_core::{
    AffineTransform, DeformableTransform, Interpolation, StagedVolume, TransformChain, Volume,
};
use crate::error::Result;
use crate::params::DeformableParams;

/// A fixed/moving pair and where the registration writes its outputs.
///
/// The moving volume is aligned onto the fixed one; the resulting transform
/// maps the moving volume's frame to the fixed volume's frame.
#[derive(Debug)]
pub struct RegistrationRequest<'a, B: Backend> {
    pub fixed: &'a StagedVolume<B>,
    pub moving: &'a StagedVolume<B>,
    /// Moving volume resampled onto the fixed grid.
    pub resampled_path: &'a Path,
    /// Transform artifact: affine matrix text or control-point grid.
    pub transform_path: &'a Path,
}

impl<'a, B: Backend> RegistrationRequest<'a, B> {
    pub fn new(
        fixed: &'a StagedVolume<B>,
        moving: &'a StagedVolume<B>,
        resampled_path: &'a Path,
        transform_path: &'a Path,
    ) -> Self {
        Self {
            fixed,
            moving,
            resampled_path,
            transform_path,
        }
    }
}

/// Result of an affine registration.
#[derive(Debug, Clone)]
pub struct AffineOutput<B: Backend> {
    pub resampled: StagedVolume<B>,
    pub transform: AffineTransform,
    pub matrix_path: PathBuf,
}

/// Result of a deformable registration.
#[derive(Debug, Clone)]
pub struct DeformableOutput<B: Backend> {
    pub resampled: StagedVolume<B>,
    pub transform: DeformableTransform<B>,
    pub artifact_path: PathBuf,
}

/// Registration backend.
///
/// Implementations must report any failure to converge or to produce their
/// outputs as `RegistrationFailure` naming the fixed/moving pair.
pub trait Registrar<B: Backend> {
    /// Align `request.moving` onto `request.fixed` with an affine, or a rigid
    /// transform when `rigid_only` is set.
    fn register_affine(&self, request: &RegistrationRequest<'_, B>, rigid_only: bool) -> Result<AffineOutput<B>>;

    /// Refine an affine alignment with a smooth displacement field.
    ///
    /// The returned transform is anchored to `initial.transform`.
    fn register_deformable(
        &self,
        request: &RegistrationRequest<'_, B>,
        initial: &AffineOutput<B>,
        params: &DeformableParams,
    ) -> Result<DeformableOutput<B>>;

    /// Re-import a deformable artifact written by an earlier run.
    fn load_deformable(
        &self,
        reference: &StagedVolume<B>,
        artifact: &Path,
        anchor: &AffineTransform,
    ) -> Result<DeformableTransform<B>>;

    /// Resample `volume` onto `reference` through `chain`.
    fn resample(
        &self,
        volume: &Volume<B>,
        reference: &Volume<B>,
        chain: &TransformChain<B>,
        interpolation: Interpolation,
    ) -> Result<Volume<B>> {
        Ok(atlasprop_core::resample(volume, reference, chain, interpolation)?)
    }
}
