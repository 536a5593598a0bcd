pub mod error;
pub mod naming;
pub mod config;
pub mod log_sink;
pub mod propagation;
pub mod mask_policy;
pub mod t2;
pub mod dti;
pub mod batch;
mod output;

pub use error::{PipelineError, ErrorKind, StageError, Result};
pub use naming::ArtifactNames;
pub use config::{AtlasConfig, T2Config, DtiConfig, PipelineConfig};
pub use log_sink::RunLogSink;
pub use propagation::{LabelSet, LabelPropagator};
pub use mask_policy::{select_mask_source, MaskSelection, MaskSource, ReferenceMask};
pub use t2::{T2Stage, T2Inputs, T2Output, T2Products, T2SessionPaths};
pub use dti::{DtiStage, DtiInputs, DtiOutput};
pub use batch::{run_batch, BatchReport, SubjectOutcome, SubjectSummary};
