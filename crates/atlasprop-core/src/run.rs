//! Per-subject run record and artifact transactions.

use std::path::{Path, PathBuf};
use burn::tensor::backend::Backend;

use crate::transform::SpatialTransform;

/// An optional step that did not run, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedStep {
    pub step: String,
    pub reason: String,
}

/// Outcome of one completed stage.
#[derive(Debug, Clone)]
pub struct StageRecord<B: Backend> {
    pub stage: String,
    pub transform: Option<SpatialTransform<B>>,
    pub artifacts: Vec<PathBuf>,
    pub skipped: Vec<SkippedStep>,
}

impl<B: Backend> StageRecord<B> {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            transform: None,
            artifacts: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: impl Into<SpatialTransform<B>>) -> Self {
        self.transform = Some(transform.into());
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<PathBuf>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }

    /// Record a skipped optional step.
    pub fn skip(mut self, step: impl Into<String>, reason: impl Into<String>) -> Self {
        self.skipped.push(SkippedStep {
            step: step.into(),
            reason: reason.into(),
        });
        self
    }
}

/// In-memory record of one subject's pipeline run.
///
/// Stages append records in completion order; later stages look up the
/// transforms of earlier ones by stage name.
#[derive(Debug, Clone)]
pub struct PipelineRun<B: Backend> {
    subject: String,
    records: Vec<StageRecord<B>>,
}

impl<B: Backend> PipelineRun<B> {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            records: Vec::new(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn record(&mut self, record: StageRecord<B>) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StageRecord<B>] {
        &self.records
    }

    /// Most recent record of the named stage.
    pub fn stage(&self, name: &str) -> Option<&StageRecord<B>> {
        self.records.iter().rev().find(|r| r.stage == name)
    }

    /// Transform produced by the named stage.
    pub fn transform(&self, name: &str) -> Option<&SpatialTransform<B>> {
        self.stage(name).and_then(|r| r.transform.as_ref())
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Path> {
        self.records.iter().flat_map(|r| r.artifacts.iter().map(PathBuf::as_path))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &SkippedStep> {
        self.records.iter().flat_map(|r| r.skipped.iter())
    }
}

/// Files written by one stage, removed again unless the stage commits.
///
/// A stage tracks every path before writing it; if the stage returns early
/// with an error the set is dropped and the partial outputs are deleted.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
    committed: bool,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a file and return its path.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.files.push(path.clone());
        path
    }

    /// Track a directory created by the stage; removed recursively on rollback.
    pub fn track_dir(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.dirs.push(path.clone());
        path
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Keep the tracked outputs and return the file list.
    pub fn commit(mut self) -> Vec<PathBuf> {
        self.committed = true;
        std::mem::take(&mut self.files)
    }
}

impl Drop for ArtifactSet {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in self.files.iter().filter(|p| p.exists()) {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("failed to remove partial artifact {}: {}", path.display(), e);
            } else {
                tracing::debug!("removed partial artifact {}", path.display());
            }
        }
        for dir in self.dirs.iter().filter(|p| p.exists()) {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                tracing::warn!("failed to remove partial directory {}: {}", dir.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::SpaceId;
    use crate::transform::AffineTransform;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_lookup_by_stage_name() {
        let mut run = PipelineRun::<TestBackend>::new("sub01");
        run.record(
            StageRecord::new("t2_affine")
                .with_transform(AffineTransform::identity(SpaceId::atlas()))
                .with_artifacts(vec![PathBuf::from("a.nii.gz")]),
        );
        run.record(StageRecord::new("t2_mask").skip("lesion mask", "no mask found"));

        assert!(run.transform("t2_affine").is_some());
        assert!(run.transform("t2_mask").is_none());
        assert!(run.stage("dti_rigid").is_none());
        assert_eq!(run.artifacts().count(), 1);
        assert_eq!(run.skipped().next().unwrap().step, "lesion mask");
    }

    #[test]
    fn test_uncommitted_artifacts_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.txt");
        let dropped = dir.path().join("dropped.txt");
        let subdir = dir.path().join("DSI_studio");

        {
            let mut set = ArtifactSet::new();
            std::fs::write(set.track(&kept), "x").unwrap();
            let files = set.commit();
            assert_eq!(files, vec![kept.clone()]);
        }
        {
            let mut set = ArtifactSet::new();
            std::fs::write(set.track(&dropped), "x").unwrap();
            std::fs::create_dir(set.track_dir(&subdir)).unwrap();
        }

        assert!(kept.exists());
        assert!(!dropped.exists());
        assert!(!subdir.exists());
    }
}
