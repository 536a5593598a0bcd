//! Diffusion (DTI) stage.
//!
//! Aligns the diffusion reference volume to the subject's T2 scan with a
//! rigid transform, then reaches atlas space in one hop by appending that
//! link to the structural stage's deformable transform. Lesion overlaps are
//! computed against two label granularities from one mask, and every volume
//! destined for DSI Studio is rescaled and flipped as one set.

use std::path::PathBuf;
use burn::tensor::backend::Backend;

use atlasprop_core::{
    superpose_each, AffineTransform, ArtifactSet, LabelVolume, Mask, PipelineRun, SpaceId, StageRecord,
    StagedVolume, TransformChain, Volume,
};
use atlasprop_io::{load_mask, load_volume};
use atlasprop_registration::{Registrar, RegistrationRequest, RegistrationStage};

use crate::config::{AtlasConfig, DtiConfig};
use crate::error::{PipelineError, Result, StageError};
use crate::log_sink::RunLogSink;
use crate::mask_policy::{select_mask_source, MaskSource, ReferenceMask};
use crate::naming::{self, ArtifactNames};
use crate::output::{at, copy_tracked, recreate_dir, save_tracked};
use crate::propagation::{LabelPropagator, LabelSet};
use crate::t2::T2Products;

pub const DTI_SETUP: &str = "dti_setup";
pub const DTI_RIGID: &str = "dti_rigid";
pub const DTI_LABELS: &str = "dti_labels";
pub const DTI_TEMPLATE: &str = "dti_template";
pub const DTI_LESION_MASK: &str = "dti_lesion_mask";
pub const DTI_SUPERPOSITION: &str = "dti_superposition";
pub const DTI_DSI_STUDIO: &str = "dti_dsi_studio";

/// Largest deviation of the rigid link's Gram matrix from identity.
const RIGIDITY_TOLERANCE: f64 = 1e-3;

/// Coordinate frame of a subject's diffusion scan.
pub fn dti_space(subject: &str) -> SpaceId {
    SpaceId::subject(subject, "dti")
}

/// Files the diffusion stage reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtiInputs {
    /// Brain-extracted diffusion reference volume.
    pub volume: PathBuf,
    /// Brain mask on the diffusion grid; `<base>_mask.nii.gz` when unset.
    pub brain_mask: Option<PathBuf>,
}

impl DtiInputs {
    pub fn new(volume: impl Into<PathBuf>) -> Self {
        Self {
            volume: volume.into(),
            brain_mask: None,
        }
    }

    pub fn with_brain_mask(mut self, mask: impl Into<PathBuf>) -> Self {
        self.brain_mask = Some(mask.into());
        self
    }
}

/// Run record of one diffusion run.
#[derive(Debug)]
pub struct DtiOutput<B: Backend> {
    pub run: PipelineRun<B>,
    pub mask_source: MaskSource,
    /// Everything written under `DSI_studio/`.
    pub dsi_files: Vec<PathBuf>,
}

/// Label sets in diffusion space.
struct DiffusionLabels<B: Backend> {
    split: LabelSet<B>,
    split_rsfmri: LabelSet<B>,
}

/// Diffusion stage orchestrator.
pub struct DtiStage<'a, R: ?Sized> {
    registrar: &'a R,
    atlas: &'a AtlasConfig,
    config: &'a DtiConfig,
}

impl<'a, R: ?Sized> DtiStage<'a, R> {
    pub fn new(registrar: &'a R, atlas: &'a AtlasConfig, config: &'a DtiConfig) -> Self {
        Self { registrar, atlas, config }
    }

    /// Run the diffusion stage, writing outputs next to the diffusion volume.
    ///
    /// `reference` is the result of looking up another session's
    /// atlas-space lesion mask; see [`crate::mask_policy`] for precedence.
    pub fn run<B>(
        &self,
        inputs: &DtiInputs,
        products: &T2Products<B>,
        reference: &ReferenceMask,
        device: &B::Device,
    ) -> std::result::Result<DtiOutput<B>, StageError>
    where
        B: Backend,
        R: Registrar<B>,
    {
        let input_name = inputs.volume.display().to_string();
        let names = ArtifactNames::for_input(&inputs.volume).map_err(at(&input_name, DTI_SETUP))?;
        let subject = names.base().to_string();
        let _sink = RunLogSink::install(names.log(naming::DTI_LOG)).map_err(at(&subject, DTI_SETUP))?;
        tracing::info!("[{}] DTI registration of {}", subject, inputs.volume.display());

        let space = dti_space(&subject);
        let dti = load_volume(&inputs.volume, space.clone(), device)
            .map(|v| StagedVolume::new(v, &inputs.volume))
            .map_err(at(&subject, DTI_SETUP))?;
        let mut run = PipelineRun::new(subject.as_str());

        let rigid = RegistrationStage::new(self.registrar, DTI_RIGID)
            .affine(
                &mut run,
                &RegistrationRequest::new(&dti, &products.t2, &names.path(naming::T2W), &names.path(naming::TRANS_MATRIX_AFF)),
                true,
            )
            .map_err(at(&subject, DTI_RIGID))?
            .transform;
        if !rigid.is_rigid(RIGIDITY_TOLERANCE) {
            tracing::warn!(
                "[{}] {} returned a matrix that is not rigid:\n{}",
                subject,
                DTI_RIGID,
                rigid.matrix()
            );
        }

        let (record, labels) = self
            .atlas_to_dti(&names, products, &rigid, &dti, device)
            .map_err(at(&subject, DTI_LABELS))?;
        run.record(record);

        let (record, template) = self
            .template_to_dti(&names, products, &rigid, &dti)
            .map_err(at(&subject, DTI_TEMPLATE))?;
        run.record(record);

        let selection = select_mask_source(reference, products.lesion_mask.as_deref());
        for notice in &selection.notices {
            tracing::warn!("[{}] {}, continuing", subject, notice);
        }
        let (record, mask) = self
            .lesion_to_dti(&names, products, &rigid, &dti, &selection.source, device)
            .map_err(at(&subject, DTI_LESION_MASK))?;
        run.record(record);

        let (record, overlaps) = self
            .superposition(&names, mask.as_ref(), &labels)
            .map_err(at(&subject, DTI_SUPERPOSITION))?;
        run.record(record);

        let brain_mask_path = inputs.brain_mask.clone().unwrap_or_else(|| names.path(naming::BRAIN_MASK));
        let (record, dsi_files) = self
            .dsi_studio(&names, &labels, &template, &brain_mask_path, overlaps.as_ref(), &space, device)
            .map_err(at(&subject, DTI_DSI_STUDIO))?;
        run.record(record);

        tracing::info!("[{}] DTI registration completed, {} artifacts", subject, run.artifacts().count());
        Ok(DtiOutput {
            run,
            mask_source: selection.source,
            dsi_files,
        })
    }

    /// Label sets through `[atlas -> T2 deformable, T2 -> DTI rigid]` in one pass.
    fn atlas_to_dti<B: Backend>(
        &self,
        names: &ArtifactNames,
        products: &T2Products<B>,
        rigid: &AffineTransform,
        dti: &StagedVolume<B>,
        device: &B::Device,
    ) -> Result<(StageRecord<B>, DiffusionLabels<B>)> {
        let chain = TransformChain::new(products.deformable.clone()).then(rigid.clone())?;
        let propagator = LabelPropagator::new(chain);

        let sets = [
            LabelSet::load("split_annotation", &self.atlas.split_annotation, SpaceId::atlas(), device)?
                .with_lookup_table(&self.atlas.split_lookup),
            LabelSet::load("split_annotation_rsfmri", &self.atlas.split_annotation_rsfmri, SpaceId::atlas(), device)?
                .with_lookup_table(&self.atlas.split_rsfmri_lookup),
            LabelSet::load("parental_annotation_rsfmri", &self.atlas.parental_annotation_rsfmri, SpaceId::atlas(), device)?,
        ];
        let suffixes = [naming::ANNO_SPLIT, naming::ANNO_SPLIT_RSFMRI, naming::ANNO_RSFMRI];

        let mut artifacts = ArtifactSet::new();
        let mut warped = propagator.propagate_all(&sets, &dti.volume)?;
        for (set, suffix) in warped.iter().zip(suffixes) {
            save_tracked(&mut artifacts, names.path(suffix), set.labels.volume())?;
        }
        warped.truncate(2);
        let split_rsfmri = warped.pop().ok_or_else(|| PipelineError::invalid_input("label set missing"))?;
        let split = warped.pop().ok_or_else(|| PipelineError::invalid_input("label set missing"))?;

        let record = StageRecord::new(DTI_LABELS)
            .with_transform(rigid.clone())
            .with_artifacts(artifacts.commit());
        Ok((record, DiffusionLabels { split, split_rsfmri }))
    }

    /// T2-space atlas template through the rigid link.
    fn template_to_dti<B: Backend>(
        &self,
        names: &ArtifactNames,
        products: &T2Products<B>,
        rigid: &AffineTransform,
        dti: &StagedVolume<B>,
    ) -> Result<(StageRecord<B>, Volume<B>)> {
        let mut artifacts = ArtifactSet::new();
        let propagator = LabelPropagator::new(TransformChain::new(rigid.clone()));
        let template = propagator.propagate_intensity(&products.template.volume, &dti.volume)?;
        save_tracked(&mut artifacts, names.path(naming::TEMPLATE), &template)?;
        Ok((StageRecord::new(DTI_TEMPLATE).with_artifacts(artifacts.commit()), template))
    }

    fn lesion_to_dti<B: Backend>(
        &self,
        names: &ArtifactNames,
        products: &T2Products<B>,
        rigid: &AffineTransform,
        dti: &StagedVolume<B>,
        source: &MaskSource,
        device: &B::Device,
    ) -> Result<(StageRecord<B>, Option<Mask<B>>)> {
        let record = StageRecord::new(DTI_LESION_MASK);
        let (mask, chain) = match source {
            MaskSource::CrossSession { session, path } => {
                tracing::info!("using lesion mask of session {}: {}", session, path.display());
                let mask = load_mask(path, SpaceId::atlas(), device)?;
                let chain = TransformChain::new(products.forward_affine.clone()).then(rigid.clone())?;
                (mask, chain)
            }
            MaskSource::CurrentSession(path) => {
                tracing::info!("using lesion mask {}", path.display());
                let mask = load_mask(path, products.t2_space().clone(), device)?;
                (mask, TransformChain::new(rigid.clone()))
            }
            MaskSource::None => {
                return Ok((record.skip("lesion mask", "no lesion mask available"), None));
            }
        };

        let mut artifacts = ArtifactSet::new();
        let warped = LabelPropagator::new(chain).propagate_mask(&mask, &dti.volume)?;
        save_tracked(&mut artifacts, names.path(naming::STROKE_MASK), warped.volume())?;
        if warped.is_empty() {
            tracing::warn!("lesion mask is empty after propagation");
        }
        Ok((record.with_artifacts(artifacts.commit()), Some(warped)))
    }

    /// Overlap of the lesion with both split label sets, from the same mask.
    fn superposition<B: Backend>(
        &self,
        names: &ArtifactNames,
        mask: Option<&Mask<B>>,
        labels: &DiffusionLabels<B>,
    ) -> Result<(StageRecord<B>, Option<[LabelVolume<B>; 2]>)> {
        let record = StageRecord::new(DTI_SUPERPOSITION);
        let Some(mask) = mask else {
            return Ok((record.skip("lesion superposition", "no lesion mask available"), None));
        };

        let mut artifacts = ArtifactSet::new();
        let mut overlaps = superpose_each(mask, &[&labels.split.labels, &labels.split_rsfmri.labels])?;
        save_tracked(&mut artifacts, names.path(naming::ANNO_MASK), overlaps[0].volume())?;
        save_tracked(&mut artifacts, names.path(naming::ANNO_RSFMRI_MASK), overlaps[1].volume())?;

        let rsfmri = overlaps.pop().ok_or_else(|| PipelineError::invalid_input("overlap missing"))?;
        let split = overlaps.pop().ok_or_else(|| PipelineError::invalid_input("overlap missing"))?;
        Ok((record.with_artifacts(artifacts.commit()), Some([split, rsfmri])))
    }

    /// Rescale and flip every DSI Studio input as one set.
    #[allow(clippy::too_many_arguments)]
    fn dsi_studio<B: Backend>(
        &self,
        names: &ArtifactNames,
        labels: &DiffusionLabels<B>,
        template: &Volume<B>,
        brain_mask: &std::path::Path,
        overlaps: Option<&[LabelVolume<B>; 2]>,
        space: &SpaceId,
        device: &B::Device,
    ) -> Result<(StageRecord<B>, Vec<PathBuf>)> {
        let mut artifacts = ArtifactSet::new();
        recreate_dir(&mut artifacts, names.dsi_dir())?;

        let brain_mask = load_mask(brain_mask, space.clone(), device)?;
        let split_lookup = labels.split.lookup_table.as_deref();
        let rsfmri_lookup = labels.split_rsfmri.lookup_table.as_deref();

        let mut members: Vec<(Volume<B>, &str, Option<&std::path::Path>)> = vec![
            (labels.split.labels.volume().clone(), naming::ANNO_SCALED, split_lookup),
            (labels.split_rsfmri.labels.volume().clone(), naming::ANNO_RSFMRI_SPLIT_SCALED, rsfmri_lookup),
            (template.clone(), naming::ALLEN_SCALED, None),
            (brain_mask.into_volume(), naming::MASK_SCALED, None),
        ];
        if let Some([split, rsfmri]) = overlaps {
            members.push((split.volume().clone(), naming::STROKE_MASK_SCALED, split_lookup));
            members.push((rsfmri.volume().clone(), naming::RSFMRI_MASK_SCALED, rsfmri_lookup));
        }

        let (volumes, targets): (Vec<_>, Vec<_>) = members.into_iter().map(|(v, stem, lookup)| (v, (stem, lookup))).unzip();
        let rescaled = self.config.rescaler.apply(volumes)?;
        for (volume, (stem, lookup)) in rescaled.iter().zip(targets) {
            save_tracked(&mut artifacts, names.dsi_volume(stem), volume)?;
            if let Some(lookup) = lookup {
                copy_tracked(&mut artifacts, lookup, names.dsi_lookup(stem))?;
            }
        }
        tracing::info!(
            "{} volumes rescaled by {} for DSI Studio in {}",
            rescaled.len(),
            self.config.rescaler.factor,
            names.dsi_dir().display()
        );

        let files = artifacts.commit();
        let mut record = StageRecord::new(DTI_DSI_STUDIO).with_artifacts(files.clone());
        if overlaps.is_none() {
            record = record.skip("scaled lesion overlaps", "no lesion mask available");
        }
        Ok((record, files))
    }
}
