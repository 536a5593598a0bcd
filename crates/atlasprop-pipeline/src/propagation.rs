//! Label propagation engine.
//!
//! A [`LabelPropagator`] owns one transform chain, computed once, and maps
//! any number of label sets through it. Each set is resampled in a single
//! nearest-neighbour pass from atlas space onto the reference grid, so the
//! hops of a multi-hop chain never introduce intermediate resampling.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use burn::tensor::backend::Backend;

use atlasprop_core::{
    resample, resample_labels, resample_mask, Interpolation, LabelVolume, Mask, SpaceId, Transform,
    TransformChain, Volume,
};
use atlasprop_io::load_labels;
use crate::error::Result;

/// A named label volume and its optional DSI Studio lookup table.
#[derive(Debug, Clone)]
pub struct LabelSet<B: Backend> {
    pub name: String,
    pub labels: LabelVolume<B>,
    pub lookup_table: Option<PathBuf>,
}

impl<B: Backend> LabelSet<B> {
    pub fn new(name: impl Into<String>, labels: LabelVolume<B>) -> Self {
        Self {
            name: name.into(),
            labels,
            lookup_table: None,
        }
    }

    pub fn with_lookup_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.lookup_table = Some(path.into());
        self
    }

    /// Load a label volume from disk.
    pub fn load(name: impl Into<String>, path: &Path, space: SpaceId, device: &B::Device) -> Result<Self> {
        Ok(Self::new(name, load_labels(path, space, device)?))
    }

    pub fn space(&self) -> &SpaceId {
        self.labels.space()
    }
}

/// Carries label sets, masks and intensity volumes through one shared chain.
#[derive(Debug, Clone)]
pub struct LabelPropagator<B: Backend> {
    chain: Arc<TransformChain<B>>,
}

impl<B: Backend> LabelPropagator<B> {
    /// Take ownership of `chain`; consecutive affine links are merged once here.
    pub fn new(chain: TransformChain<B>) -> Self {
        Self {
            chain: Arc::new(chain.composed()),
        }
    }

    /// Reuse a chain already shared elsewhere.
    pub fn from_shared(chain: Arc<TransformChain<B>>) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &Arc<TransformChain<B>> {
        &self.chain
    }

    pub fn source(&self) -> &SpaceId {
        self.chain.source()
    }

    pub fn target(&self) -> &SpaceId {
        self.chain.target()
    }

    /// Resample one label set onto `reference` with nearest-neighbour interpolation.
    ///
    /// # Errors
    /// `SpaceMismatch` if the set is not in the chain's source space or the
    /// reference is not in its target space.
    pub fn propagate(&self, set: &LabelSet<B>, reference: &Volume<B>) -> Result<LabelSet<B>> {
        tracing::debug!(
            "propagating {} from {} to {} ({} links)",
            set.name,
            self.chain.source(),
            self.chain.target(),
            self.chain.len()
        );
        let labels = resample_labels(&set.labels, reference, &self.chain)?;
        Ok(LabelSet {
            name: set.name.clone(),
            labels,
            lookup_table: set.lookup_table.clone(),
        })
    }

    /// Propagate several label sets through the same chain.
    pub fn propagate_all(&self, sets: &[LabelSet<B>], reference: &Volume<B>) -> Result<Vec<LabelSet<B>>> {
        sets.iter().map(|set| self.propagate(set, reference)).collect()
    }

    pub fn propagate_mask(&self, mask: &Mask<B>, reference: &Volume<B>) -> Result<Mask<B>> {
        Ok(resample_mask(mask, reference, &self.chain)?)
    }

    /// Resample an intensity volume (template) with continuous interpolation.
    pub fn propagate_intensity(&self, volume: &Volume<B>, reference: &Volume<B>) -> Result<Volume<B>> {
        Ok(resample(volume, reference, &self.chain, Interpolation::Continuous)?)
    }
}
