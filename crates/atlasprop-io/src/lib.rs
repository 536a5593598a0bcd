pub mod error;
pub mod nifti_io;
pub mod matrix;

pub use error::{IoFailure, Result};
pub use nifti_io::{
    load_volume, load_labels, load_mask, save_volume, read_displacement_field, write_displacement_field,
};
pub use matrix::{read_affine_matrix, write_affine_matrix, parse_affine_matrix, format_affine_matrix};
