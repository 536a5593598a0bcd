use std::path::{Path, PathBuf};
use burn::tensor::backend::Backend;

use super::volume::Volume;

/// A volume together with the file it was loaded from or written to.
///
/// External registration tools work on files, so volumes handed to them
/// keep their on-disk location alongside the in-memory data.
#[derive(Debug, Clone)]
pub struct StagedVolume<B: Backend> {
    pub volume: Volume<B>,
    pub path: PathBuf,
}

impl<B: Backend> StagedVolume<B> {
    pub fn new(volume: Volume<B>, path: impl Into<PathBuf>) -> Self {
        Self { volume, path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
