pub mod error;
pub mod space;
pub mod volume;
pub mod transform;
pub mod interpolation;
pub mod filter;
pub mod superposition;
pub mod rescale;
pub mod run;

pub use error::{CoreError, Result};
pub use space::SpaceId;
pub use volume::{Volume, LabelVolume, Mask, SpatialUnit, Axis, StagedVolume};
pub use transform::{Transform, AffineTransform, DeformableTransform, DisplacementField, SpatialTransform, TransformChain};
pub use interpolation::Interpolation;
pub use filter::{resample, resample_labels, resample_mask, ResampleFilter};
pub use superposition::{superpose, superpose_each};
pub use rescale::CoordinateRescaler;
pub use run::{PipelineRun, StageRecord, SkippedStep, ArtifactSet};
