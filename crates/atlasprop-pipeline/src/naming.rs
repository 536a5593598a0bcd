//! Output file names.
//!
//! Every artifact is named `<base><suffix>` where `<base>` is the input file
//! name up to its first `.`. Downstream tooling locates files by these exact
//! suffixes, so they must not change.

use std::path::{Path, PathBuf};
use crate::error::{PipelineError, Result};

// Structural stage.
pub const TEMPLATE_AFF: &str = "_TemplateAff.nii.gz";
pub const MATRIX_AFF: &str = "MatrixAff.txt";
pub const INCIDENCE_DATA: &str = "_IncidenceData.nii.gz";
pub const MATRIX_INV: &str = "MatrixInv.txt";
pub const INCIDENCE_MASK: &str = "_IncidenceData_mask.nii.gz";
pub const TEMPLATE: &str = "_Template.nii.gz";
pub const MATRIX_BSPLINE: &str = "MatrixBspline.nii";
pub const TEMPLATE_ALLEN: &str = "_TemplateAllen.nii.gz";
pub const ANNO_RSFMRI_T2: &str = "_AnnorsfMRI.nii.gz";
pub const ANNO: &str = "_Anno.nii.gz";
pub const T2_LOG: &str = "reg.log";

// Diffusion stage.
pub const T2W: &str = "_T2w.nii.gz";
pub const TRANS_MATRIX_AFF: &str = "transMatrixAff.txt";
pub const ANNO_SPLIT: &str = "_AnnoSplit.nii.gz";
pub const ANNO_SPLIT_RSFMRI: &str = "_AnnoSplit_rsfMRI.nii.gz";
pub const ANNO_RSFMRI: &str = "_Anno_rsfMRI.nii.gz";
pub const STROKE_MASK: &str = "Stroke_mask.nii.gz";
pub const ANNO_MASK: &str = "Anno_mask.nii.gz";
pub const ANNO_RSFMRI_MASK: &str = "Anno_rsfMRI_mask.nii.gz";
pub const BRAIN_MASK: &str = "_mask.nii.gz";
pub const DTI_LOG: &str = "registration.log";

// DSI Studio inputs.
pub const DSI_STUDIO_DIR: &str = "DSI_studio";
pub const ANNO_SCALED: &str = "Anno_scaled";
pub const ANNO_RSFMRI_SPLIT_SCALED: &str = "Anno_rsfMRISplit_scaled";
pub const ALLEN_SCALED: &str = "Allen_scaled";
pub const MASK_SCALED: &str = "Mask_scaled";
pub const STROKE_MASK_SCALED: &str = "StrokeMask_scaled";
pub const RSFMRI_MASK_SCALED: &str = "rsfMRI_Mask_scaled";

// Session layout: `<root>/<session>/<subject>/{T2w,DTI}/`.
pub const T2_DIR: &str = "T2w";
pub const DTI_DIR: &str = "DTI";
/// Brain-extracted input volumes end with this.
pub const BET: &str = "Bet.nii.gz";
/// Lesion mask drawn on a T2 scan.
pub const LESION_MASK: &str = STROKE_MASK;
/// Atlas-space lesion mask written by the structural stage.
pub const INCIDENCE_MASK_FILE: &str = "IncidenceData_mask.nii.gz";

/// Base name of a file: its name up to the first `.`.
pub fn base_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::invalid_input(format!("{} has no file name", path.display())))?;
    match name.split('.').next() {
        Some(base) if !base.is_empty() => Ok(base.to_string()),
        _ => Err(PipelineError::invalid_input(format!("{} has an empty base name", path.display()))),
    }
}

/// Artifact paths derived from one input volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    dir: PathBuf,
    base: String,
}

impl ArtifactNames {
    /// Names for outputs written next to `input`.
    pub fn for_input(input: &Path) -> Result<Self> {
        let base = base_name(input)?;
        let dir = input.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self { dir, base })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<base><suffix>`.
    pub fn path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.base, suffix))
    }

    pub fn dsi_dir(&self) -> PathBuf {
        self.dir.join(DSI_STUDIO_DIR)
    }

    /// Rescaled volume for DSI Studio (uncompressed `.nii`).
    pub fn dsi_volume(&self, stem: &str) -> PathBuf {
        self.dsi_dir().join(format!("{}{}.nii", self.base, stem))
    }

    /// Lookup table accompanying a rescaled label volume.
    pub fn dsi_lookup(&self, stem: &str) -> PathBuf {
        self.dsi_dir().join(format!("{}{}.txt", self.base, stem))
    }

    pub fn log(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}
