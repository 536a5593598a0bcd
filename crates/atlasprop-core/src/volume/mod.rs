//! Volume data model.
//!
//! A [`Volume`] is a scalar field on a voxel grid, placed in a named
//! coordinate frame by a 4×4 affine. [`LabelVolume`] and [`Mask`] wrap a
//! volume and restrict the values it may hold.

pub mod volume;
pub mod label;
pub mod mask;
pub mod grid;
pub mod staged;

pub use volume::{Volume, SpatialUnit, Axis};
pub use label::LabelVolume;
pub use mask::Mask;
pub use staged::StagedVolume;
