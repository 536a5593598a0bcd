//! Pipeline configuration.

use std::path::{Path, PathBuf};
use serde::{Serialize, Deserialize};

use atlasprop_core::CoordinateRescaler;
use atlasprop_io::IoFailure;
use atlasprop_registration::{DeformableParams, NiftyReg};
use crate::error::{PipelineError, Result};

/// Atlas resources shared by every subject.
///
/// The defaults name the files of the standard atlas directory, relative to
/// `lib/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Template registered onto each T2 scan.
    pub template: PathBuf,
    /// Reference atlas template (atlas space proper).
    pub atlas_template: PathBuf,
    /// Anatomical annotation.
    pub annotation: PathBuf,
    /// Annotation at connectivity granularity.
    pub annotation_rsfmri: PathBuf,
    /// Hemisphere-split annotation.
    pub split_annotation: PathBuf,
    /// Hemisphere-split connectivity annotation.
    pub split_annotation_rsfmri: PathBuf,
    /// Parental connectivity annotation.
    pub parental_annotation_rsfmri: PathBuf,
    /// DSI Studio lookup table of `split_annotation`.
    pub split_lookup: PathBuf,
    /// DSI Studio lookup table of `split_annotation_rsfmri`.
    pub split_rsfmri_lookup: PathBuf,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self::from_lib_dir("lib")
    }
}

impl AtlasConfig {
    /// Standard file names inside `dir`.
    pub fn from_lib_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            template: dir.join("NP_template_sc0.nii.gz"),
            atlas_template: dir.join("average_template_50.nii.gz"),
            annotation: dir.join("annotation_50CHANGEDanno.nii.gz"),
            annotation_rsfmri: dir.join("annoVolume+2000_rsfMRI.nii.gz"),
            split_annotation: dir.join("ARA_annotationR+2000.nii.gz"),
            split_annotation_rsfmri: dir.join("annoVolume+2000_rsfMRI.nii.gz"),
            parental_annotation_rsfmri: dir.join("annoVolume.nii.gz"),
            split_lookup: dir.join("ARA_annotationR+2000.nii.txt"),
            split_rsfmri_lookup: dir.join("annoVolume+2000_rsfMRI.nii.txt"),
        }
    }

    /// Fail on the first resource that does not exist.
    pub fn validate(&self) -> Result<()> {
        let all = [
            &self.template,
            &self.atlas_template,
            &self.annotation,
            &self.annotation_rsfmri,
            &self.split_annotation,
            &self.split_annotation_rsfmri,
            &self.parental_annotation_rsfmri,
            &self.split_lookup,
            &self.split_rsfmri_lookup,
        ];
        match all.into_iter().find(|p| !p.exists()) {
            Some(missing) => Err(IoFailure::new(missing, "atlas resource does not exist").into()),
            None => Ok(()),
        }
    }
}

/// Structural stage settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct T2Config {
    pub deformable: DeformableParams,
}

impl T2Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deformable(mut self, params: DeformableParams) -> Self {
        self.deformable = params;
        self
    }
}

/// Diffusion stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtiConfig {
    /// Conversion applied to every DSI Studio input.
    pub rescaler: CoordinateRescaler,
    /// Session whose atlas-space lesion mask replaces the current one.
    pub reference_session: Option<String>,
}

impl Default for DtiConfig {
    fn default() -> Self {
        Self {
            rescaler: CoordinateRescaler::DSI_STUDIO,
            reference_session: None,
        }
    }
}

impl DtiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rescaler(mut self, rescaler: CoordinateRescaler) -> Self {
        self.rescaler = rescaler;
        self
    }

    pub fn with_reference_session(mut self, session: impl Into<String>) -> Self {
        self.reference_session = Some(session.into());
        self
    }
}

/// Complete configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub atlas: AtlasConfig,
    pub niftyreg: NiftyReg,
    pub t2: T2Config,
    pub dti: DtiConfig,
    /// Worker threads for batch runs; all cores when unset.
    pub threads: Option<usize>,
}

impl PipelineConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PipelineError::invalid_input(format!("configuration: {}", e)))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| IoFailure::new(path, e))?;
        Self::from_json_str(&text).map_err(|e| match e {
            PipelineError::InvalidInput(msg) => PipelineError::invalid_input(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| PipelineError::invalid_input(e.to_string()))
    }
}
