//! Spatial transforms between named coordinate frames.
//!
//! All transforms here store pull-back maps (target points to source
//! points). Composition checks frames at every step.

pub mod trait_;
pub mod affine;
pub mod displacement_field;
pub mod deformable;
pub mod chain;

pub use trait_::Transform;
pub use affine::AffineTransform;
pub use displacement_field::DisplacementField;
pub use deformable::DeformableTransform;
pub use chain::{SpatialTransform, TransformChain};
