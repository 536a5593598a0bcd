//! Structural (T2) stage.
//!
//! Sequence for one T2 scan:
//!
//! 1. affine template -> T2
//! 2. independent affine T2 -> atlas
//! 3. lesion mask T2 -> atlas, when the session has one
//! 4. deformable template -> T2, starting from step 1
//! 5. atlas template and label sets through the deformable transform

use std::path::{Path, PathBuf};
use burn::tensor::backend::Backend;

use atlasprop_core::{
    AffineTransform, ArtifactSet, DeformableTransform, PipelineRun, SpaceId, StageRecord, StagedVolume,
    TransformChain,
};
use atlasprop_io::{load_mask, load_volume, read_affine_matrix};
use atlasprop_registration::{AffineOutput, Registrar, RegistrationRequest, RegistrationStage};

use crate::config::{AtlasConfig, T2Config};
use crate::error::{Result, StageError};
use crate::log_sink::RunLogSink;
use crate::naming::{self, ArtifactNames};
use crate::output::{at, save_tracked};
use crate::propagation::{LabelPropagator, LabelSet};

pub const T2_SETUP: &str = "t2_setup";
pub const T2_AFFINE: &str = "t2_affine";
pub const T2_INVERSE: &str = "t2_inverse";
pub const T2_LESION_MASK: &str = "t2_lesion_mask";
pub const T2_DEFORMABLE: &str = "t2_deformable";
pub const T2_LABELS: &str = "t2_labels";

/// Coordinate frame of a subject's T2 scan.
pub fn t2_space(subject: &str) -> SpaceId {
    SpaceId::subject(subject, "t2")
}

/// Files the structural stage reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct T2Inputs {
    /// Brain-extracted T2 volume.
    pub volume: PathBuf,
    /// Lesion mask drawn on the T2 volume.
    pub lesion_mask: Option<PathBuf>,
}

impl T2Inputs {
    pub fn new(volume: impl Into<PathBuf>) -> Self {
        Self {
            volume: volume.into(),
            lesion_mask: None,
        }
    }

    pub fn with_lesion_mask(mut self, mask: impl Into<PathBuf>) -> Self {
        self.lesion_mask = Some(mask.into());
        self
    }
}

/// What the diffusion stage needs from a finished structural stage.
#[derive(Debug, Clone)]
pub struct T2Products<B: Backend> {
    /// The T2 volume itself.
    pub t2: StagedVolume<B>,
    /// Atlas template resampled into T2 space.
    pub template: StagedVolume<B>,
    /// Affine atlas -> T2.
    pub forward_affine: AffineTransform,
    /// Deformable atlas -> T2, anchored to `forward_affine`.
    pub deformable: DeformableTransform<B>,
    /// Lesion mask in T2 space.
    pub lesion_mask: Option<PathBuf>,
}

/// On-disk locations of a structural stage's products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct T2SessionPaths {
    pub t2: PathBuf,
    pub template: PathBuf,
    pub matrix_aff: PathBuf,
    pub bspline: PathBuf,
    pub lesion_mask: Option<PathBuf>,
}

impl T2SessionPaths {
    /// Products of a structural stage run on `t2`, located by their names.
    pub fn for_input(t2: &Path, lesion_mask: Option<PathBuf>) -> Result<Self> {
        let names = ArtifactNames::for_input(t2)?;
        Ok(Self {
            t2: t2.to_path_buf(),
            template: names.path(naming::TEMPLATE_ALLEN),
            matrix_aff: names.path(naming::MATRIX_AFF),
            bspline: names.path(naming::MATRIX_BSPLINE),
            lesion_mask,
        })
    }
}

impl<B: Backend> T2Products<B> {
    pub fn t2_space(&self) -> &SpaceId {
        self.t2.volume.space()
    }

    /// Reload the products of an earlier structural run.
    pub fn load<R>(registrar: &R, paths: &T2SessionPaths, device: &B::Device) -> Result<Self>
    where
        R: Registrar<B> + ?Sized,
    {
        let space = t2_space(&naming::base_name(&paths.t2)?);
        let t2 = StagedVolume::new(load_volume(&paths.t2, space.clone(), device)?, &paths.t2);
        let template = StagedVolume::new(load_volume(&paths.template, space.clone(), device)?, &paths.template);
        let forward_affine = AffineTransform::new(read_affine_matrix(&paths.matrix_aff)?, SpaceId::atlas(), space)?;
        let deformable = registrar.load_deformable(&t2, &paths.bspline, &forward_affine)?;
        Ok(Self {
            t2,
            template,
            forward_affine,
            deformable,
            lesion_mask: paths.lesion_mask.clone(),
        })
    }
}

/// Run record and products of one structural run.
#[derive(Debug)]
pub struct T2Output<B: Backend> {
    pub run: PipelineRun<B>,
    pub products: T2Products<B>,
}

/// Structural stage orchestrator.
pub struct T2Stage<'a, R: ?Sized> {
    registrar: &'a R,
    atlas: &'a AtlasConfig,
    config: &'a T2Config,
}

impl<'a, R: ?Sized> T2Stage<'a, R> {
    pub fn new(registrar: &'a R, atlas: &'a AtlasConfig, config: &'a T2Config) -> Self {
        Self { registrar, atlas, config }
    }

    /// Run the structural stage on `inputs`, writing outputs next to the T2 volume.
    ///
    /// Any failure aborts the run and is attributed to the failing stage;
    /// only a missing lesion mask is tolerated.
    pub fn run<B>(&self, inputs: &T2Inputs, device: &B::Device) -> std::result::Result<T2Output<B>, StageError>
    where
        B: Backend,
        R: Registrar<B>,
    {
        let input_name = inputs.volume.display().to_string();
        let names = ArtifactNames::for_input(&inputs.volume).map_err(at(&input_name, T2_SETUP))?;
        let subject = names.base().to_string();
        let _sink = RunLogSink::install(names.log(naming::T2_LOG)).map_err(at(&subject, T2_SETUP))?;
        tracing::info!("[{}] T2 registration of {}", subject, inputs.volume.display());

        let space = t2_space(&subject);
        let (t2, template, atlas_template) = self.load_inputs(inputs, space.clone(), device).map_err(at(&subject, T2_SETUP))?;
        let mut run = PipelineRun::new(subject.as_str());

        let affine = RegistrationStage::new(self.registrar, T2_AFFINE)
            .affine(
                &mut run,
                &RegistrationRequest::new(&t2, &template, &names.path(naming::TEMPLATE_AFF), &names.path(naming::MATRIX_AFF)),
                false,
            )
            .map_err(at(&subject, T2_AFFINE))?;

        let inverse = RegistrationStage::new(self.registrar, T2_INVERSE)
            .affine(
                &mut run,
                &RegistrationRequest::new(&atlas_template, &t2, &names.path(naming::INCIDENCE_DATA), &names.path(naming::MATRIX_INV)),
                false,
            )
            .map_err(at(&subject, T2_INVERSE))?;

        let record = self
            .lesion_to_atlas(inputs, &names, &inverse, &atlas_template, space, device)
            .map_err(at(&subject, T2_LESION_MASK))?;
        run.record(record);

        let deformable = RegistrationStage::new(self.registrar, T2_DEFORMABLE)
            .deformable(
                &mut run,
                &RegistrationRequest::new(&t2, &template, &names.path(naming::TEMPLATE), &names.path(naming::MATRIX_BSPLINE)),
                &affine,
                &self.config.deformable,
            )
            .map_err(at(&subject, T2_DEFORMABLE))?;

        let propagator = LabelPropagator::new(TransformChain::new(deformable.transform.clone()));
        let (record, warped_template) = self
            .atlas_to_t2(&names, &propagator, &atlas_template, &t2, device)
            .map_err(at(&subject, T2_LABELS))?;
        run.record(record);

        tracing::info!("[{}] T2 registration completed, {} artifacts", subject, run.artifacts().count());
        Ok(T2Output {
            run,
            products: T2Products {
                t2,
                template: warped_template,
                forward_affine: affine.transform,
                deformable: deformable.transform,
                lesion_mask: inputs.lesion_mask.clone(),
            },
        })
    }

    fn load_inputs<B: Backend>(
        &self,
        inputs: &T2Inputs,
        space: SpaceId,
        device: &B::Device,
    ) -> Result<(StagedVolume<B>, StagedVolume<B>, StagedVolume<B>)> {
        let t2 = StagedVolume::new(load_volume(&inputs.volume, space, device)?, &inputs.volume);
        let template = StagedVolume::new(load_volume(&self.atlas.template, SpaceId::atlas(), device)?, &self.atlas.template);
        let atlas_template = StagedVolume::new(
            load_volume(&self.atlas.atlas_template, SpaceId::atlas(), device)?,
            &self.atlas.atlas_template,
        );
        Ok((t2, template, atlas_template))
    }

    /// Carry the session's lesion mask into atlas space through the inverse affine.
    fn lesion_to_atlas<B: Backend>(
        &self,
        inputs: &T2Inputs,
        names: &ArtifactNames,
        inverse: &AffineOutput<B>,
        atlas_template: &StagedVolume<B>,
        space: SpaceId,
        device: &B::Device,
    ) -> Result<StageRecord<B>> {
        let record = StageRecord::new(T2_LESION_MASK);
        let Some(path) = &inputs.lesion_mask else {
            tracing::warn!("{} has no lesion mask, continuing without", inputs.volume.display());
            return Ok(record.skip("lesion mask", "no lesion mask in the current session"));
        };

        let mut artifacts = ArtifactSet::new();
        let mask = load_mask(path, space, device)?;
        let propagator = LabelPropagator::new(TransformChain::new(inverse.transform.clone()));
        let warped = propagator.propagate_mask(&mask, &atlas_template.volume)?;
        save_tracked(&mut artifacts, names.path(naming::INCIDENCE_MASK), warped.volume())?;
        tracing::info!("lesion mask {} propagated to atlas space ({} voxels)", path.display(), warped.voxel_count());
        Ok(record.with_transform(inverse.transform.clone()).with_artifacts(artifacts.commit()))
    }

    /// Atlas template and label sets into T2 space.
    fn atlas_to_t2<B: Backend>(
        &self,
        names: &ArtifactNames,
        propagator: &LabelPropagator<B>,
        atlas_template: &StagedVolume<B>,
        t2: &StagedVolume<B>,
        device: &B::Device,
    ) -> Result<(StageRecord<B>, StagedVolume<B>)> {
        let mut artifacts = ArtifactSet::new();

        let template = propagator.propagate_intensity(&atlas_template.volume, &t2.volume)?;
        let template_path = save_tracked(&mut artifacts, names.path(naming::TEMPLATE_ALLEN), &template)?;

        let sets = [
            (LabelSet::load("annotation_rsfmri", &self.atlas.annotation_rsfmri, SpaceId::atlas(), device)?, naming::ANNO_RSFMRI_T2),
            (LabelSet::load("annotation", &self.atlas.annotation, SpaceId::atlas(), device)?, naming::ANNO),
        ];
        for (set, suffix) in &sets {
            let warped = propagator.propagate(set, &t2.volume)?;
            save_tracked(&mut artifacts, names.path(suffix), warped.labels.volume())?;
        }

        let record = StageRecord::new(T2_LABELS).with_artifacts(artifacts.commit());
        Ok((record, StagedVolume::new(template, template_path)))
    }
}
