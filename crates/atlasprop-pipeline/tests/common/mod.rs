#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use atlasprop_core::{
    AffineTransform, DeformableTransform, Interpolation, SpaceId, StagedVolume, TransformChain, Volume,
};
use atlasprop_io::{read_displacement_field, save_volume, write_affine_matrix, write_displacement_field};
use atlasprop_pipeline::AtlasConfig;
use atlasprop_registration::{
    AffineOutput, DeformableOutput, DeformableParams, Registrar, RegistrationError, RegistrationRequest, Result,
};
use burn_ndarray::NdArray;
use nalgebra::Matrix4;

pub type TestBackend = NdArray<f32>;

pub const SHAPE: [usize; 3] = [4, 4, 4];

/// One registrar call: `(mode, fixed file, moving file)`.
pub type Call = (String, String, String);

/// Registrar with scripted affine alignments (identity unless set), writing
/// NiftyReg-compatible artifacts. Deformable refinements keep the initial
/// affine with a zero residual.
#[derive(Default)]
pub struct MockRegistrar {
    /// Fail any registration whose transform file name ends with this.
    pub fail_on: Option<String>,
    /// Pull matrix returned for a transform file name ending with the key.
    pub matrices: Vec<(String, Matrix4<f64>)>,
    pub calls: Mutex<Vec<Call>>,
}

impl MockRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(suffix: &str) -> Self {
        Self {
            fail_on: Some(suffix.to_string()),
            ..Default::default()
        }
    }

    pub fn with_matrix(mut self, suffix: &str, matrix: Matrix4<f64>) -> Self {
        self.matrices.push((suffix.to_string(), matrix));
        self
    }

    fn matrix_for(&self, request: &RegistrationRequest<'_, TestBackend>) -> Matrix4<f64> {
        let name = file_name(request.transform_path);
        self.matrices
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix.as_str()))
            .map(|(_, m)| *m)
            .unwrap_or_else(Matrix4::identity)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn log(&self, mode: &str, request: &RegistrationRequest<'_, TestBackend>) {
        self.calls.lock().unwrap().push((mode.to_string(), file_name(request.fixed.path()), file_name(request.moving.path())));
    }

    fn check_failure(&self, request: &RegistrationRequest<'_, TestBackend>) -> Result<()> {
        if let Some(suffix) = &self.fail_on {
            if file_name(request.transform_path).ends_with(suffix.as_str()) {
                return Err(RegistrationError::failure(request.fixed.path(), request.moving.path(), "did not converge"));
            }
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

impl Registrar<TestBackend> for MockRegistrar {
    fn register_affine(
        &self,
        request: &RegistrationRequest<'_, TestBackend>,
        rigid_only: bool,
    ) -> Result<AffineOutput<TestBackend>> {
        self.log(if rigid_only { "rigid" } else { "affine" }, request);
        save_volume(request.resampled_path, &request.moving.volume)?;
        self.check_failure(request)?;

        let transform = AffineTransform::new(
            self.matrix_for(request),
            request.moving.volume.space().clone(),
            request.fixed.volume.space().clone(),
        )?;
        write_affine_matrix(request.transform_path, transform.matrix())?;
        let chain = TransformChain::new(transform.clone());
        let resampled = self.resample(&request.moving.volume, &request.fixed.volume, &chain, Interpolation::Continuous)?;
        save_volume(request.resampled_path, &resampled)?;
        Ok(AffineOutput {
            resampled: StagedVolume::new(resampled, request.resampled_path),
            transform,
            matrix_path: request.transform_path.to_path_buf(),
        })
    }

    fn register_deformable(
        &self,
        request: &RegistrationRequest<'_, TestBackend>,
        initial: &AffineOutput<TestBackend>,
        _params: &DeformableParams,
    ) -> Result<DeformableOutput<TestBackend>> {
        self.log("deformable", request);
        self.check_failure(request)?;

        let fixed = &request.fixed.volume;
        let transform = DeformableTransform::from_anchor(initial.transform.clone(), fixed.shape(), *fixed.affine(), &fixed.device())?;
        write_displacement_field(request.transform_path, &transform.to_displacement()?)?;
        let chain = TransformChain::new(transform.clone());
        let resampled = self.resample(&request.moving.volume, fixed, &chain, Interpolation::Continuous)?;
        save_volume(request.resampled_path, &resampled)?;
        Ok(DeformableOutput {
            resampled: StagedVolume::new(resampled, request.resampled_path),
            transform,
            artifact_path: request.transform_path.to_path_buf(),
        })
    }

    fn load_deformable(
        &self,
        reference: &StagedVolume<TestBackend>,
        artifact: &Path,
        anchor: &AffineTransform,
    ) -> Result<DeformableTransform<TestBackend>> {
        let field = read_displacement_field::<TestBackend>(artifact, &reference.volume.device())?;
        Ok(DeformableTransform::from_displacement(anchor.clone(), &field)?)
    }
}

/// Pull matrix translating by whole voxels.
pub fn shift(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m[(0, 3)] = x;
    m[(1, 3)] = y;
    m[(2, 3)] = z;
    m
}

/// Pull matrix of a quarter turn about the z axis through the grid centre:
/// `(x, y, z) -> (3 - y, x, z)`.
pub fn quarter_turn() -> Matrix4<f64> {
    Matrix4::new(
        0.0, -1.0, 0.0, 3.0,
        1.0, 0.0, 0.0, 0.0,
        0.0, 0.0, 1.0, 0.0,
        0.0, 0.0, 0.0, 1.0,
    )
}

/// Label encoding its own atlas voxel: `1 + x + 4y + 16z`.
pub fn coordinate_label(z: usize, y: usize, x: usize) -> f32 {
    (1 + x + 4 * y + 16 * z) as f32
}

/// Value at `[z, y, x]` of a test grid.
pub fn at(values: &[f32], z: usize, y: usize, x: usize) -> f32 {
    values[(z * SHAPE[1] + y) * SHAPE[2] + x]
}

pub fn volume_from(f: impl Fn(usize, usize, usize) -> f32, space: SpaceId) -> Volume<TestBackend> {
    let mut values = Vec::with_capacity(64);
    for z in 0..SHAPE[0] {
        for y in 0..SHAPE[1] {
            for x in 0..SHAPE[2] {
                values.push(f(z, y, x));
            }
        }
    }
    Volume::from_values(values, SHAPE, Matrix4::identity(), space, &Default::default()).unwrap()
}

pub fn write(path: &Path, volume: &Volume<TestBackend>) -> PathBuf {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    save_volume(path, volume).unwrap();
    path.to_path_buf()
}

pub fn annotation(z: usize, y: usize, x: usize) -> f32 {
    ((x + y + z) % 4) as f32 * 100.0
}

pub fn split_annotation(z: usize, _y: usize, x: usize) -> f32 {
    (if x < 2 { 1000 } else { 2000 } + z) as f32
}

pub fn split_rsfmri(_z: usize, y: usize, _x: usize) -> f32 {
    (y + 1) as f32 * 10.0
}

/// Current-session lesion: the `x == 1` plane.
pub fn lesion(_z: usize, _y: usize, x: usize) -> f32 {
    if x == 1 { 1.0 } else { 0.0 }
}

/// Reference-session lesion: the `y == 2` plane.
pub fn reference_lesion(_z: usize, y: usize, _x: usize) -> f32 {
    if y == 2 { 3.0 } else { 0.0 }
}

/// Atlas resources plus one subject with a T2 and a DTI session.
pub struct Fixture {
    pub atlas: AtlasConfig,
    pub t2: PathBuf,
    pub lesion_mask: PathBuf,
    pub dti: PathBuf,
    pub reference_mask: PathBuf,
}

pub fn fixture(root: &Path) -> Fixture {
    let lib = root.join("lib");
    let atlas = AtlasConfig::from_lib_dir(&lib);
    let a = SpaceId::atlas();
    write(&atlas.template, &volume_from(|z, y, x| (z * 16 + y * 4 + x) as f32, a.clone()));
    write(&atlas.atlas_template, &volume_from(|z, y, x| (x * 3 + y * 2 + z) as f32, a.clone()));
    write(&atlas.annotation, &volume_from(annotation, a.clone()));
    write(&atlas.annotation_rsfmri, &volume_from(split_rsfmri, a.clone()));
    write(&atlas.split_annotation, &volume_from(split_annotation, a.clone()));
    write(&atlas.parental_annotation_rsfmri, &volume_from(|_, y, _| (y % 2) as f32 + 1.0, a.clone()));
    std::fs::write(&atlas.split_lookup, "1000 left\n2000 right\n").unwrap();
    std::fs::write(&atlas.split_rsfmri_lookup, "10 a\n20 b\n").unwrap();

    let t2_dir = root.join("P7").join("sub01_1").join("T2w");
    let t2 = write(&t2_dir.join("sub01_1Bet.nii.gz"), &volume_from(|z, y, x| (z + y + x) as f32, SpaceId::new("file")));
    let lesion_mask = write(&t2_dir.join("sub01_1Stroke_mask.nii.gz"), &volume_from(lesion, SpaceId::new("file")));

    let dti_dir = root.join("P7").join("sub01_1").join("DTI");
    let dti = write(&dti_dir.join("sub01_1dti.nii.gz"), &volume_from(|z, y, x| (z * y + x) as f32, SpaceId::new("file")));
    write(&dti_dir.join("sub01_1dti_mask.nii.gz"), &volume_from(|_, _, _| 1.0, SpaceId::new("file")));

    let ref_dir = root.join("P5").join("sub01_1").join("T2w");
    let reference_mask = write(&ref_dir.join("sub01_1Bet_IncidenceData_mask.nii.gz"), &volume_from(reference_lesion, a));

    Fixture {
        atlas,
        t2,
        lesion_mask,
        dti,
        reference_mask,
    }
}
