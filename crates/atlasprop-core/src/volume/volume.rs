//! Scalar volume with a voxel-to-world affine.

use burn::tensor::{Int, Tensor, TensorData, Shape};
use burn::tensor::backend::Backend;
use nalgebra::{Matrix4, Vector3};
use serde::{Serialize, Deserialize};

use crate::error::{CoreError, Result};
use crate::space::SpaceId;
use crate::transform::affine::apply_matrix;

/// Tolerance used when comparing affines of two grids.
pub const GRID_TOLERANCE: f64 = 1e-6;

/// Physical unit of the world coordinates an affine maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SpatialUnit {
    Metre,
    #[default]
    Millimetre,
    Micrometre,
    Unknown,
}

impl SpatialUnit {
    /// Decode the spatial bits of a NIfTI `xyzt_units` field.
    pub fn from_nifti_code(xyzt_units: u8) -> Self {
        match xyzt_units & 0x07 {
            1 => Self::Metre,
            2 => Self::Millimetre,
            3 => Self::Micrometre,
            _ => Self::Unknown,
        }
    }

    /// Spatial bits of a NIfTI `xyzt_units` field.
    pub fn nifti_code(&self) -> u8 {
        match self {
            Self::Metre => 1,
            Self::Millimetre => 2,
            Self::Micrometre => 3,
            Self::Unknown => 0,
        }
    }
}

/// Voxel axis, named the way NIfTI orders them (`x` is the fastest axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Position of this axis in the `[Z, Y, X]` tensor layout.
    pub fn tensor_dim(&self) -> usize {
        match self {
            Self::X => 2,
            Self::Y => 1,
            Self::Z => 0,
        }
    }
}

/// 3-D scalar field in a named coordinate frame.
///
/// The data tensor is laid out `[Z, Y, X]`; the affine maps a voxel index
/// `(x, y, z, 1)` to world coordinates. Data and affine are only changed
/// together, through methods that keep them consistent.
///
/// # Examples
/// ```rust
/// use atlasprop_core::{Volume, SpaceId};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
/// use nalgebra::Matrix4;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([4, 4, 4], &device);
/// let volume = Volume::new(data, Matrix4::identity(), SpaceId::atlas()).unwrap();
/// assert_eq!(volume.shape(), [4, 4, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct Volume<B: Backend> {
    data: Tensor<B, 3>,
    affine: Matrix4<f64>,
    inverse_affine: Matrix4<f64>,
    space: SpaceId,
    units: SpatialUnit,
}

impl<B: Backend> Volume<B> {
    /// Create a new volume.
    ///
    /// # Arguments
    /// * `data` - Voxel values laid out `[Z, Y, X]`
    /// * `affine` - Voxel index to world matrix
    /// * `space` - Coordinate frame the world coordinates belong to
    ///
    /// # Errors
    /// `SingularAffine` when the affine has no inverse or its bottom row is
    /// not `[0, 0, 0, 1]`; `InvalidVolume` for an empty grid.
    pub fn new(data: Tensor<B, 3>, affine: Matrix4<f64>, space: SpaceId) -> Result<Self> {
        let inverse_affine = validate_affine(&affine)?;
        let dims = data.dims();
        if dims.iter().any(|&d| d == 0) {
            return Err(CoreError::invalid_volume(format!("empty grid {:?}", dims)));
        }
        Ok(Self {
            data,
            affine,
            inverse_affine,
            space,
            units: SpatialUnit::default(),
        })
    }

    /// Build a volume from values in `[Z, Y, X]` row-major order.
    pub fn from_values(
        values: Vec<f32>,
        shape: [usize; 3],
        affine: Matrix4<f64>,
        space: SpaceId,
        device: &B::Device,
    ) -> Result<Self> {
        let expected = shape[0] * shape[1] * shape[2];
        if values.len() != expected {
            return Err(CoreError::invalid_volume(format!(
                "{} values for a {:?} grid",
                values.len(),
                shape
            )));
        }
        let data = Tensor::<B, 3>::from_data(TensorData::new(values, Shape::new(shape)), device);
        Self::new(data, affine, space)
    }

    /// Set the spatial unit.
    pub fn with_units(mut self, units: SpatialUnit) -> Self {
        self.units = units;
        self
    }

    pub fn data(&self) -> &Tensor<B, 3> {
        &self.data
    }

    pub fn into_data(self) -> Tensor<B, 3> {
        self.data
    }

    pub fn affine(&self) -> &Matrix4<f64> {
        &self.affine
    }

    pub fn inverse_affine(&self) -> &Matrix4<f64> {
        &self.inverse_affine
    }

    pub fn space(&self) -> &SpaceId {
        &self.space
    }

    pub fn units(&self) -> SpatialUnit {
        self.units
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Grid shape as `[Z, Y, X]`.
    pub fn shape(&self) -> [usize; 3] {
        self.data.dims()
    }

    /// Grid shape in NIfTI order `[X, Y, Z]`.
    pub fn dims_xyz(&self) -> [usize; 3] {
        let [z, y, x] = self.shape();
        [x, y, z]
    }

    pub fn voxel_count(&self) -> usize {
        self.shape().iter().product()
    }

    /// Edge lengths of one voxel along `x`, `y` and `z`.
    pub fn voxel_size(&self) -> [f64; 3] {
        let linear = self.affine.fixed_view::<3, 3>(0, 0);
        [
            linear.column(0).norm(),
            linear.column(1).norm(),
            linear.column(2).norm(),
        ]
    }

    /// World coordinate of voxel `(0, 0, 0)`.
    pub fn origin(&self) -> Vector3<f64> {
        Vector3::new(self.affine[(0, 3)], self.affine[(1, 3)], self.affine[(2, 3)])
    }

    /// Whether both volumes sample the same grid: same shape and the same
    /// affine up to [`GRID_TOLERANCE`].
    pub fn same_grid(&self, other: &Volume<B>) -> bool {
        self.shape() == other.shape()
            && (self.affine - other.affine).abs().max() <= GRID_TOLERANCE
    }

    /// Fail with `GridMismatch` unless `other` shares this volume's grid.
    pub fn ensure_same_grid(&self, other: &Volume<B>) -> Result<()> {
        if self.same_grid(other) {
            Ok(())
        } else {
            Err(CoreError::grid_mismatch(self.shape(), other.shape()))
        }
    }

    /// Replace the voxel values, keeping grid and frame.
    pub fn with_data(&self, data: Tensor<B, 3>) -> Result<Self> {
        if data.dims() != self.shape() {
            return Err(CoreError::grid_mismatch(self.shape(), data.dims()));
        }
        Ok(Self {
            data,
            affine: self.affine,
            inverse_affine: self.inverse_affine,
            space: self.space.clone(),
            units: self.units,
        })
    }

    /// Scale voxel size by `factor` while keeping the origin.
    ///
    /// The affine becomes `affine · diag(f, f, f, 1)`; voxel values are untouched.
    pub fn rescaled(&self, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(CoreError::invalid_volume(format!(
                "rescale factor must be positive, got {}",
                factor
            )));
        }
        let affine = self.affine * Matrix4::new_nonuniform_scaling(&Vector3::new(factor, factor, factor));
        let inverse_affine = validate_affine(&affine)?;
        Ok(Self {
            data: self.data.clone(),
            affine,
            inverse_affine,
            space: self.space.clone(),
            units: self.units,
        })
    }

    /// Reverse the voxel order along `axis`; the affine is kept as is.
    pub(crate) fn flipped(&self, axis: Axis) -> Self {
        let dim = axis.tensor_dim();
        let len = self.shape()[dim];
        let device = self.data.device();
        let reversed = Tensor::<B, 1, Int>::arange(0..len as i64, &device).mul_scalar(-1).add_scalar(len as i64 - 1);
        Self {
            data: self.data.clone().select(dim, reversed),
            affine: self.affine,
            inverse_affine: self.inverse_affine,
            space: self.space.clone(),
            units: self.units,
        }
    }

    /// Voxel values in `[Z, Y, X]` row-major order.
    pub fn values(&self) -> Result<Vec<f32>> {
        self.data
            .clone()
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| CoreError::invalid_volume(format!("unreadable voxel data: {:?}", e)))
    }

    /// Convert world points `[N, 3]` to continuous voxel indices `(x, y, z)`.
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        apply_matrix(&self.inverse_affine, points)
    }

    /// Convert continuous voxel indices `(x, y, z)` `[N, 3]` to world points.
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        apply_matrix(&self.affine, indices)
    }
}

/// Check the homogeneous row and invertibility of an affine, returning its inverse.
pub(crate) fn validate_affine(affine: &Matrix4<f64>) -> Result<Matrix4<f64>> {
    let bottom = [affine[(3, 0)], affine[(3, 1)], affine[(3, 2)], affine[(3, 3)]];
    if bottom != [0.0, 0.0, 0.0, 1.0] {
        return Err(CoreError::singular_affine(format!(
            "bottom row must be [0, 0, 0, 1], got {:?}",
            bottom
        )));
    }
    if affine.iter().any(|v| !v.is_finite()) {
        return Err(CoreError::singular_affine("affine contains non-finite entries"));
    }
    let det = affine.fixed_view::<3, 3>(0, 0).determinant();
    if det.abs() < 1e-12 {
        return Err(CoreError::singular_affine(format!("determinant {} is zero", det)));
    }
    affine
        .try_inverse()
        .ok_or_else(|| CoreError::singular_affine("matrix has no inverse"))
}
