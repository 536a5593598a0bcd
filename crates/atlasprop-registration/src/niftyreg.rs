//! NiftyReg command-line adapter.
//!
//! Drives `reg_aladin` for affine and rigid alignment, `reg_f3d` for the
//! B-spline refinement and `reg_transform -disp` to turn the control-point
//! grid into a dense displacement field the native resampler can use.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use burn::tensor::backend::Backend;
use serde::{Serialize, Deserialize};

use atlasprop_core::{AffineTransform, ArtifactSet, CoreError, DeformableTransform, StagedVolume};
use atlasprop_io::{load_volume, read_affine_matrix, read_displacement_field, write_affine_matrix};
use crate::error::{RegistrationError, Result};
use crate::params::DeformableParams;
use crate::registrar::{AffineOutput, DeformableOutput, Registrar, RegistrationRequest};

/// Settings of the NiftyReg tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NiftyReg {
    /// Directory holding the executables; `PATH` lookup when unset.
    pub bin_dir: Option<PathBuf>,
    /// Value for `OMP_NUM_THREADS` in the child processes.
    pub threads: Option<usize>,
}

impl NiftyReg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the directory holding the NiftyReg executables.
    pub fn with_bin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = Some(dir.into());
        self
    }

    /// Limit the OpenMP threads of each tool invocation.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    fn tool(&self, name: &str) -> PathBuf {
        match &self.bin_dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Run one tool to completion; any failure is charged to the fixed/moving pair.
    fn run(&self, name: &str, args: Vec<OsString>, fixed: &Path, moving: &Path) -> Result<()> {
        let mut command = Command::new(self.tool(name));
        command.args(&args);
        if let Some(threads) = self.threads {
            command.env("OMP_NUM_THREADS", threads.to_string());
        }
        tracing::debug!("running {:?}", command);

        let output = command
            .output()
            .map_err(|e| RegistrationError::failure(fixed, moving, format!("failed to start {}: {}", name, e)))?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            tracing::debug!(target: "niftyreg", "{}", line);
        }
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(RegistrationError::failure(
                fixed,
                moving,
                format!("{} exited with {}: {}", name, output.status, tail.join(" | ")),
            ));
        }
        Ok(())
    }

    fn expect_outputs(&self, outputs: &[&Path], fixed: &Path, moving: &Path) -> Result<()> {
        match outputs.iter().find(|p| !p.exists()) {
            Some(missing) => Err(RegistrationError::failure(
                fixed,
                moving,
                format!("expected output {} was not written", missing.display()),
            )),
            None => Ok(()),
        }
    }

    /// Convert a control-point grid into a deformable transform on `reference`'s grid.
    fn import_cpp<B: Backend>(
        &self,
        reference: &StagedVolume<B>,
        cpp: &Path,
        anchor: &AffineTransform,
        moving: &Path,
    ) -> Result<DeformableTransform<B>> {
        // Scratch output; removed on every return path.
        let mut scratch = ArtifactSet::new();
        let disp = scratch.track(sibling(cpp, "_disp.nii.gz"));
        self.run(
            "reg_transform",
            vec!["-ref".into(), reference.path().into(), "-disp".into(), cpp.into(), disp.clone().into()],
            reference.path(),
            moving,
        )?;
        self.expect_outputs(&[&disp], reference.path(), moving)?;

        let field = read_displacement_field::<B>(&disp, &reference.volume.device())?;
        Ok(DeformableTransform::from_displacement(anchor.clone(), &field)?)
    }
}

/// `dir/<stem><suffix>` next to `path`, with the NIfTI extension stripped from the stem.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let stem = name.split('.').next().unwrap_or_default();
    path.with_file_name(format!("{}{}", stem, suffix))
}

impl<B: Backend> Registrar<B> for NiftyReg {
    fn register_affine(&self, request: &RegistrationRequest<'_, B>, rigid_only: bool) -> Result<AffineOutput<B>> {
        let fixed = request.fixed.path();
        let moving = request.moving.path();

        let mut args: Vec<OsString> = vec![
            "-ref".into(), fixed.into(),
            "-flo".into(), moving.into(),
            "-res".into(), request.resampled_path.into(),
            "-aff".into(), request.transform_path.into(),
        ];
        if rigid_only {
            args.push("-rigOnly".into());
        }
        self.run("reg_aladin", args, fixed, moving)?;
        self.expect_outputs(&[request.resampled_path, request.transform_path], fixed, moving)?;

        let matrix = read_affine_matrix(request.transform_path)?;
        let transform = AffineTransform::new(
            matrix,
            request.moving.volume.space().clone(),
            request.fixed.volume.space().clone(),
        )?;
        let resampled = load_volume::<B>(
            request.resampled_path,
            request.fixed.volume.space().clone(),
            &request.fixed.volume.device(),
        )?;
        Ok(AffineOutput {
            resampled: StagedVolume::new(resampled, request.resampled_path),
            transform,
            matrix_path: request.transform_path.to_path_buf(),
        })
    }

    fn register_deformable(
        &self,
        request: &RegistrationRequest<'_, B>,
        initial: &AffineOutput<B>,
        params: &DeformableParams,
    ) -> Result<DeformableOutput<B>> {
        params.validate()?;
        let fixed = request.fixed.path();
        let moving = request.moving.path();
        let moving_space = request.moving.volume.space();
        let fixed_space = request.fixed.volume.space();
        if initial.transform.source() != moving_space {
            return Err(CoreError::space_mismatch(moving_space, initial.transform.source()).into());
        }
        if initial.transform.target() != fixed_space {
            return Err(CoreError::space_mismatch(fixed_space, initial.transform.target()).into());
        }

        // reg_f3d reads the initial affine from a file; a written one lives
        // only as long as this call.
        let mut scratch = ArtifactSet::new();
        let matrix_path = if initial.matrix_path.exists() {
            initial.matrix_path.clone()
        } else {
            let path = scratch.track(sibling(request.transform_path, "_init.txt"));
            write_affine_matrix(&path, initial.transform.matrix())?;
            path
        };

        let [sx, sy, sz] = params.smoothness.spacing();
        let args: Vec<OsString> = vec![
            "-ref".into(), fixed.into(),
            "-flo".into(), moving.into(),
            "-res".into(), request.resampled_path.into(),
            "-cpp".into(), request.transform_path.into(),
            "-aff".into(), matrix_path.into(),
            "-sx".into(), sx.to_string().into(),
            "-sy".into(), sy.to_string().into(),
            "-sz".into(), sz.to_string().into(),
            "-jl".into(), params.jacobian_penalty.to_string().into(),
        ];
        self.run("reg_f3d", args, fixed, moving)?;
        self.expect_outputs(&[request.resampled_path, request.transform_path], fixed, moving)?;

        let transform = self.import_cpp(request.fixed, request.transform_path, &initial.transform, moving)?;
        let resampled = load_volume::<B>(request.resampled_path, fixed_space.clone(), &request.fixed.volume.device())?;
        Ok(DeformableOutput {
            resampled: StagedVolume::new(resampled, request.resampled_path),
            transform,
            artifact_path: request.transform_path.to_path_buf(),
        })
    }

    fn load_deformable(
        &self,
        reference: &StagedVolume<B>,
        artifact: &Path,
        anchor: &AffineTransform,
    ) -> Result<DeformableTransform<B>> {
        if !artifact.exists() {
            return Err(RegistrationError::failure(
                reference.path(),
                artifact,
                "control-point grid does not exist",
            ));
        }
        self.import_cpp(reference, artifact, anchor, artifact)
    }
}
