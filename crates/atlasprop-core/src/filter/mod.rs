//! Image filters.

pub mod resample;

pub use resample::{resample, resample_labels, resample_mask, ResampleFilter};
