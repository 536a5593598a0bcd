//! Per-run log file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::subscriber::DefaultGuard;

use atlasprop_io::IoFailure;
use crate::error::Result;

/// Routes this thread's log events into one run's log file.
///
/// While the sink is alive it is the thread-local default subscriber;
/// dropping it restores whatever subscriber was active before, including
/// on early return or unwinding.
pub struct RunLogSink {
    path: PathBuf,
    _guard: DefaultGuard,
}

impl RunLogSink {
    /// Truncate `path` and install it as this thread's log destination.
    pub fn install(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| IoFailure::new(&path, e))?;

        let subscriber = tracing_subscriber::fmt()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);

        Ok(Self { path, _guard: guard })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RunLogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogSink").field("path", &self.path).finish()
    }
}
