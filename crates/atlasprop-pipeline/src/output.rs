//! Tracked writes shared by the orchestrators.

use std::path::{Path, PathBuf};
use burn::tensor::backend::Backend;

use atlasprop_core::{ArtifactSet, Volume};
use atlasprop_io::{save_volume, IoFailure};
use crate::error::{PipelineError, Result};

/// Save `volume` to `path`, tracking the file in `artifacts` first.
pub(crate) fn save_tracked<B: Backend>(artifacts: &mut ArtifactSet, path: PathBuf, volume: &Volume<B>) -> Result<PathBuf> {
    let path = artifacts.track(path);
    save_volume(&path, volume)?;
    tracing::debug!("wrote {}", path.display());
    Ok(path)
}

/// Copy a companion text file (lookup table) into place.
pub(crate) fn copy_tracked(artifacts: &mut ArtifactSet, from: &Path, to: PathBuf) -> Result<PathBuf> {
    let to = artifacts.track(to);
    std::fs::copy(from, &to).map_err(|e| IoFailure::new(from, e))?;
    Ok(to)
}

/// Remove and recreate an output directory owned by one stage.
pub(crate) fn recreate_dir(artifacts: &mut ArtifactSet, dir: PathBuf) -> Result<PathBuf> {
    if dir.exists() {
        std::fs::remove_dir_all(&dir).map_err(|e| IoFailure::new(&dir, e))?;
    }
    std::fs::create_dir_all(&dir).map_err(|e| IoFailure::new(&dir, e))?;
    Ok(artifacts.track_dir(dir))
}

/// Map an error into a [`StageError`](crate::error::StageError) for `stage`.
///
/// Registration failures were already logged by the stage executor; every
/// other failure is logged here.
pub(crate) fn at<'a, E: Into<PipelineError>>(
    subject: &'a str,
    stage: &'a str,
) -> impl FnOnce(E) -> crate::error::StageError + 'a {
    move |e| {
        let err = crate::error::StageError::new(subject, stage, e);
        if !logged_by_executor(&err.error) {
            tracing::error!("{}", err);
        }
        err
    }
}

fn logged_by_executor(error: &PipelineError) -> bool {
    matches!(error, PipelineError::Registration(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlasprop_registration::RegistrationError;

    #[test]
    fn test_only_unlogged_failures_are_logged_at_the_boundary() {
        let registration = PipelineError::from(RegistrationError::failure(Path::new("t2.nii.gz"), Path::new("template.nii.gz"), "diverged"));
        assert!(logged_by_executor(&registration));
        assert!(!logged_by_executor(&PipelineError::invalid_input("corrupt header")));

        let err = at::<PipelineError>("sub01", "t2_affine")(registration);
        assert_eq!(err.stage, "t2_affine");
        assert_eq!(err.subject, "sub01");
    }
}
