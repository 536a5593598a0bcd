//! Registration stage executor.

use std::time::Instant;
use burn::tensor::backend::Backend;

use atlasprop_core::{ArtifactSet, PipelineRun, StageRecord};
use crate::error::Result;
use crate::params::DeformableParams;
use crate::registrar::{AffineOutput, DeformableOutput, Registrar, RegistrationRequest};

/// Runs one named registration through a [`Registrar`] and records it.
///
/// The outputs named in the request are tracked for the duration of the
/// call. On failure they are removed and the error is logged; on success the
/// transform and the artifact paths are appended to the run under the
/// stage name.
pub struct RegistrationStage<'r, R: ?Sized> {
    registrar: &'r R,
    name: String,
}

impl<'r, R: ?Sized> RegistrationStage<'r, R> {
    pub fn new(registrar: &'r R, name: impl Into<String>) -> Self {
        Self {
            registrar,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Affine (or rigid) registration of `request.moving` onto `request.fixed`.
    pub fn affine<B>(
        &self,
        run: &mut PipelineRun<B>,
        request: &RegistrationRequest<'_, B>,
        rigid_only: bool,
    ) -> Result<AffineOutput<B>>
    where
        B: Backend,
        R: Registrar<B>,
    {
        let kind = if rigid_only { "rigid" } else { "affine" };
        tracing::info!(
            "[{}] {} {}: {} -> {}",
            run.subject(),
            self.name,
            kind,
            request.moving.path().display(),
            request.fixed.path().display()
        );
        let started = Instant::now();

        let mut artifacts = ArtifactSet::new();
        artifacts.track(request.resampled_path);
        artifacts.track(request.transform_path);

        let output = self
            .registrar
            .register_affine(request, rigid_only)
            .map_err(|e| self.failed(run.subject(), e))?;

        let files = artifacts.commit();
        run.record(
            StageRecord::new(self.name.as_str())
                .with_transform(output.transform.clone())
                .with_artifacts(files),
        );
        tracing::info!("[{}] {} completed in {:.2}s", run.subject(), self.name, started.elapsed().as_secs_f64());
        Ok(output)
    }

    /// Deformable refinement starting from `initial`.
    pub fn deformable<B>(
        &self,
        run: &mut PipelineRun<B>,
        request: &RegistrationRequest<'_, B>,
        initial: &AffineOutput<B>,
        params: &DeformableParams,
    ) -> Result<DeformableOutput<B>>
    where
        B: Backend,
        R: Registrar<B>,
    {
        tracing::info!(
            "[{}] {} deformable (smoothness {}, jacobian penalty {}): {} -> {}",
            run.subject(),
            self.name,
            params.smoothness.level(),
            params.jacobian_penalty,
            request.moving.path().display(),
            request.fixed.path().display()
        );
        let started = Instant::now();

        let mut artifacts = ArtifactSet::new();
        artifacts.track(request.resampled_path);
        artifacts.track(request.transform_path);

        let output = self
            .registrar
            .register_deformable(request, initial, params)
            .map_err(|e| self.failed(run.subject(), e))?;

        let files = artifacts.commit();
        run.record(
            StageRecord::new(self.name.as_str())
                .with_transform(output.transform.clone())
                .with_artifacts(files),
        );
        tracing::info!("[{}] {} completed in {:.2}s", run.subject(), self.name, started.elapsed().as_secs_f64());
        Ok(output)
    }

    fn failed<E: std::fmt::Display>(&self, subject: &str, error: E) -> E {
        tracing::error!("[{}] {} failed: {}", subject, self.name, error);
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use atlasprop_core::{AffineTransform, DeformableTransform, SpaceId, StagedVolume, Volume};
    use burn_ndarray::NdArray;
    use nalgebra::Matrix4;
    use crate::error::RegistrationError;

    type TestBackend = NdArray<f32>;

    /// Writes its outputs, then fails or succeeds as configured.
    struct ScriptedRegistrar {
        fail: bool,
    }

    impl Registrar<TestBackend> for ScriptedRegistrar {
        fn register_affine(
            &self,
            request: &RegistrationRequest<'_, TestBackend>,
            _rigid_only: bool,
        ) -> Result<AffineOutput<TestBackend>> {
            std::fs::write(request.resampled_path, "partial").unwrap();
            std::fs::write(request.transform_path, "partial").unwrap();
            if self.fail {
                return Err(RegistrationError::failure(request.fixed.path(), request.moving.path(), "did not converge"));
            }
            Ok(AffineOutput {
                resampled: request.fixed.clone(),
                transform: AffineTransform::identity(SpaceId::atlas()),
                matrix_path: request.transform_path.to_path_buf(),
            })
        }

        fn register_deformable(
            &self,
            _request: &RegistrationRequest<'_, TestBackend>,
            _initial: &AffineOutput<TestBackend>,
            _params: &DeformableParams,
        ) -> Result<DeformableOutput<TestBackend>> {
            unimplemented!()
        }

        fn load_deformable(
            &self,
            _reference: &StagedVolume<TestBackend>,
            _artifact: &Path,
            _anchor: &AffineTransform,
        ) -> Result<DeformableTransform<TestBackend>> {
            unimplemented!()
        }
    }

    fn staged(dir: &Path, name: &str) -> StagedVolume<TestBackend> {
        let device = Default::default();
        let volume = Volume::from_values(vec![1.0; 8], [2, 2, 2], Matrix4::identity(), SpaceId::atlas(), &device).unwrap();
        StagedVolume::new(volume, dir.join(name))
    }

    #[test]
    fn test_success_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let fixed = staged(dir.path(), "fixed.nii.gz");
        let moving = staged(dir.path(), "moving.nii.gz");
        let res = dir.path().join("res.nii.gz");
        let aff = dir.path().join("aff.txt");

        let registrar = ScriptedRegistrar { fail: false };
        let stage = RegistrationStage::new(&registrar, "t2_affine");
        let mut run = PipelineRun::new("sub01");
        stage.affine(&mut run, &RegistrationRequest::new(&fixed, &moving, &res, &aff), false).unwrap();

        assert!(res.exists() && aff.exists());
        let record = run.stage("t2_affine").unwrap();
        assert_eq!(record.artifacts, vec![res, aff]);
        assert!(record.transform.is_some());
    }

    #[test]
    fn test_failure_removes_partial_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let fixed = staged(dir.path(), "fixed.nii.gz");
        let moving = staged(dir.path(), "moving.nii.gz");
        let res = dir.path().join("res.nii.gz");
        let aff = dir.path().join("aff.txt");

        let registrar = ScriptedRegistrar { fail: true };
        let stage = RegistrationStage::new(&registrar, "t2_affine");
        let mut run = PipelineRun::new("sub01");
        let err = stage
            .affine(&mut run, &RegistrationRequest::new(&fixed, &moving, &res, &aff), false)
            .unwrap_err();

        assert!(matches!(err, RegistrationError::RegistrationFailure { .. }));
        assert!(!res.exists());
        assert!(!aff.exists());
        assert!(run.records().is_empty());
    }
}
