use std::path::{Path, PathBuf};
use thiserror::Error;

/// A file could not be read, parsed or written.
#[derive(Error, Debug)]
#[error("I/O failure on {}: {source}", path.display())]
pub struct IoFailure {
    pub path: PathBuf,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, IoFailure>;

impl IoFailure {
    pub fn new(path: impl AsRef<Path>, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_path() {
        let err = IoFailure::new("/data/sub01/T2w.nii.gz", anyhow::anyhow!("truncated header"));
        let msg = err.to_string();
        assert!(msg.contains("/data/sub01/T2w.nii.gz"));
        assert!(msg.contains("truncated header"));
    }
}
