//! Coordinate frame identifiers.

use std::fmt;
use serde::{Serialize, Deserialize};

/// Name of a physical coordinate frame (atlas space, a subject's T2 space, ...).
///
/// Transforms and volumes carry a `SpaceId` so that compositions and
/// resampling across incompatible frames are rejected instead of silently
/// producing misaligned data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpaceId(String);

impl SpaceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The reference atlas frame shared by the templates and annotation volumes.
    pub fn atlas() -> Self {
        Self::new("atlas")
    }

    /// A frame scoped to one subject session, e.g. `sub01/t2`.
    pub fn subject(subject: &str, modality: &str) -> Self {
        Self(format!("{}/{}", subject, modality))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
