//! Local scratch files that never outlive the job using them

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A uniquely named file under the scratch directory.
///
/// Removed by [`ScratchFile::remove`] on the normal path and by `Drop`
/// when the owning future is cancelled (job timeout) or unwinds.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    /// Reserve a path; the file itself is created by whoever writes to it
    pub async fn new(dir: &Path, prefix: &str) -> crate::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}-{}.dump", prefix, Uuid::new_v4().simple()));
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file if present. Safe to call more than once.
    pub async fn remove(&mut self) -> crate::Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.removed = true;
        Ok(())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}
