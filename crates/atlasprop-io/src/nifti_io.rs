//! NIfTI-1 reading and writing.
//!
//! Volumes are read into the `[Z, Y, X]` tensor layout and written back in
//! NIfTI `(x, y, z)` order, with the affine stored in the sform (code 1).
//! Paths ending in `.gz` are compressed.

use std::path::Path;
use anyhow::{Context, bail};
use burn::tensor::{Tensor, TensorData, Shape};
use burn::tensor::backend::Backend;
use nalgebra::Matrix4;
use ndarray::{Array3, Array4, ArrayD, Axis as NdAxis, Ix3, Ix4};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use nifti::writer::WriterOptions;

use atlasprop_core::{DisplacementField, LabelVolume, Mask, SpaceId, SpatialUnit, Volume};
use crate::error::{IoFailure, Result};

/// NIfTI intent code for vector-valued voxels.
const NIFTI_INTENT_VECTOR: i16 = 1007;

/// Load a 3-D volume and place it in `space`.
///
/// Trailing singleton dimensions are squeezed; a genuine 4-D series is
/// rejected.
pub fn load_volume<B: Backend>(path: impl AsRef<Path>, space: SpaceId, device: &B::Device) -> Result<Volume<B>> {
    let path = path.as_ref();
    read_volume(path, space, device).map_err(|e| IoFailure::new(path, e))
}

/// Load a label volume; every voxel must hold a non-negative integer.
pub fn load_labels<B: Backend>(path: impl AsRef<Path>, space: SpaceId, device: &B::Device) -> Result<LabelVolume<B>> {
    let path = path.as_ref();
    let volume = load_volume(path, space, device)?;
    LabelVolume::new(volume).map_err(|e| IoFailure::new(path, e))
}

/// Load a mask, binarizing it on the way in.
pub fn load_mask<B: Backend>(path: impl AsRef<Path>, space: SpaceId, device: &B::Device) -> Result<Mask<B>> {
    let path = path.as_ref();
    let volume = load_volume(path, space, device)?;
    Mask::binarize(&volume).map_err(|e| IoFailure::new(path, e))
}

/// Write a volume with its affine in the sform.
pub fn save_volume<B: Backend>(path: impl AsRef<Path>, volume: &Volume<B>) -> Result<()> {
    let path = path.as_ref();
    write_volume(path, volume).map_err(|e| IoFailure::new(path, e))
}

/// Read a 5-D `(x, y, z, 1, 3)` displacement field.
pub fn read_displacement_field<B: Backend>(path: impl AsRef<Path>, device: &B::Device) -> Result<DisplacementField<B>> {
    let path = path.as_ref();
    read_field(path, device).map_err(|e| IoFailure::new(path, e))
}

/// Write a displacement field as a 5-D `(x, y, z, 1, 3)` vector image.
pub fn write_displacement_field<B: Backend>(path: impl AsRef<Path>, field: &DisplacementField<B>) -> Result<()> {
    let path = path.as_ref();
    write_field(path, field).map_err(|e| IoFailure::new(path, e))
}

fn read_volume<B: Backend>(path: &Path, space: SpaceId, device: &B::Device) -> anyhow::Result<Volume<B>> {
    let obj = ReaderOptions::new().read_file(path).context("Failed to read NIfTI file")?;
    let header = obj.header().clone();
    let affine = header_affine(&header);
    let units = SpatialUnit::from_nifti_code(header.xyzt_units);

    let array: ArrayD<f32> = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;
    let array = squeeze_to_3d(array)?;

    // NIfTI order is (x, y, z); the tensor layout is [Z, Y, X]
    let (nx, ny, nz) = array.dim();
    let values: Vec<f32> = array.permuted_axes([2, 1, 0]).iter().copied().collect();
    tracing::debug!("loaded {} ({}x{}x{})", path.display(), nx, ny, nz);

    let data = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new([nz, ny, nx])), device);
    Ok(Volume::new(data, affine, space)?.with_units(units))
}

fn squeeze_to_3d(mut array: ArrayD<f32>) -> anyhow::Result<Array3<f32>> {
    while array.ndim() > 3 {
        let last = array.ndim() - 1;
        if array.shape()[last] != 1 {
            bail!("Expected a 3D volume, found shape {:?}", array.shape());
        }
        array = array.index_axis_move(NdAxis(last), 0);
    }
    while array.ndim() < 3 {
        let next = array.ndim();
        array = array.insert_axis(NdAxis(next));
    }
    Ok(array.into_dimensionality::<Ix3>()?)
}

/// Voxel-to-world matrix from the sform, falling back to the qform and then
/// to plain voxel scaling.
fn header_affine(header: &NiftiHeader) -> Matrix4<f64> {
    if header.sform_code > 0 {
        let rows = [header.srow_x, header.srow_y, header.srow_z];
        let mut m = Matrix4::identity();
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in row.iter().enumerate() {
                m[(i, j)] = *v as f64;
            }
        }
        m
    } else if header.qform_code > 0 {
        let b = header.quatern_b as f64;
        let c = header.quatern_c as f64;
        let d = header.quatern_d as f64;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();
        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let dx = header.pixdim[1] as f64;
        let dy = header.pixdim[2] as f64;
        let dz = header.pixdim[3] as f64 * qfac;

        Matrix4::new(
            (a * a + b * b - c * c - d * d) * dx, (2.0 * b * c - 2.0 * a * d) * dy, (2.0 * b * d + 2.0 * a * c) * dz, header.quatern_x as f64,
            (2.0 * b * c + 2.0 * a * d) * dx, (a * a + c * c - b * b - d * d) * dy, (2.0 * c * d - 2.0 * a * b) * dz, header.quatern_y as f64,
            (2.0 * b * d - 2.0 * a * c) * dx, (2.0 * c * d + 2.0 * a * b) * dy, (a * a + d * d - c * c - b * b) * dz, header.quatern_z as f64,
            0.0, 0.0, 0.0, 1.0,
        )
    } else {
        let mut m = Matrix4::identity();
        for i in 0..3 {
            let size = header.pixdim[i + 1] as f64;
            m[(i, i)] = if size > 0.0 { size } else { 1.0 };
        }
        m
    }
}

fn header_for(affine: &Matrix4<f64>, voxel_size: [f64; 3], units: SpatialUnit) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.sform_code = 1;
    header.qform_code = 0;
    header.srow_x = [affine[(0, 0)] as f32, affine[(0, 1)] as f32, affine[(0, 2)] as f32, affine[(0, 3)] as f32];
    header.srow_y = [affine[(1, 0)] as f32, affine[(1, 1)] as f32, affine[(1, 2)] as f32, affine[(1, 3)] as f32];
    header.srow_z = [affine[(2, 0)] as f32, affine[(2, 1)] as f32, affine[(2, 2)] as f32, affine[(2, 3)] as f32];
    header.pixdim = [1.0, voxel_size[0] as f32, voxel_size[1] as f32, voxel_size[2] as f32, 1.0, 1.0, 1.0, 1.0];
    header.xyzt_units = units.nifti_code();
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header
}

fn write_volume<B: Backend>(path: &Path, volume: &Volume<B>) -> anyhow::Result<()> {
    let [nz, ny, nx] = volume.shape();
    let values = volume.values()?;

    let array = Array3::from_shape_vec((nz, ny, nx), values)
        .context("Failed to create ndarray")?
        .permuted_axes([2, 1, 0])
        .as_standard_layout()
        .to_owned();

    let header = header_for(volume.affine(), volume.voxel_size(), volume.units());
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .context("Failed to write NIfTI file")?;
    tracing::debug!("wrote {}", path.display());
    Ok(())
}

fn read_field<B: Backend>(path: &Path, device: &B::Device) -> anyhow::Result<DisplacementField<B>> {
    let obj = ReaderOptions::new().read_file(path).context("Failed to read NIfTI file")?;
    let affine = header_affine(obj.header());
    let mut array: ArrayD<f32> = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert field to ndarray")?;

    // (x, y, z, 1, 3) -> (x, y, z, 3)
    if array.ndim() == 5 {
        if array.shape()[3] != 1 {
            bail!("Displacement field must have a singleton time axis, found shape {:?}", array.shape());
        }
        array = array.index_axis_move(NdAxis(3), 0);
    }
    let array = array
        .into_dimensionality::<Ix4>()
        .context("Displacement field must be 5D (x, y, z, 1, 3)")?;
    let (nx, ny, nz, nc) = array.dim();
    if nc != 3 {
        bail!("Displacement field needs 3 components, found {}", nc);
    }

    let values: Vec<f32> = array.permuted_axes([3, 2, 1, 0]).iter().copied().collect();
    let data = Tensor::<B, 4>::from_data(TensorData::new(values, Shape::new([3, nz, ny, nx])), device);
    Ok(DisplacementField::new(data, affine)?)
}

fn write_field<B: Backend>(path: &Path, field: &DisplacementField<B>) -> anyhow::Result<()> {
    let [nz, ny, nx] = field.shape();
    let values = field
        .data()
        .clone()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {:?}", e))?;

    let array = Array4::from_shape_vec((3, nz, ny, nx), values)
        .context("Failed to create ndarray")?
        .permuted_axes([3, 2, 1, 0])
        .insert_axis(NdAxis(3))
        .as_standard_layout()
        .to_owned();

    let affine = field.affine();
    let voxel_size = [
        affine.fixed_view::<3, 1>(0, 0).norm(),
        affine.fixed_view::<3, 1>(0, 1).norm(),
        affine.fixed_view::<3, 1>(0, 2).norm(),
    ];
    let mut header = header_for(affine, voxel_size, SpatialUnit::Millimetre);
    header.intent_code = NIFTI_INTENT_VECTOR;
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .context("Failed to write displacement field")?;
    Ok(())
}
