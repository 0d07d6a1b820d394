//! Per-run scratch directories.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

const WORKSPACE_PREFIX: &str = "wksp";

/// Uniquely named directory under the temp root, private to one run.
///
/// [`close`](Self::close) removes it and logs a failure instead of returning
/// it; dropping without closing removes it silently.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace under `temp_root`, creating the root if needed.
    pub async fn create(temp_root: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(temp_root)
            .await
            .map_err(|e| PipelineError::io_at("create temp root", temp_root, e))?;
        let root = temp_root.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(WORKSPACE_PREFIX)
                .tempdir_in(&root)
                .map_err(|e| PipelineError::io_at("create workspace in", &root, e))
        })
        .await??;
        debug!(workspace = %dir.path().display(), "Created workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the workspace. Failures are logged, never returned.
    pub async fn close(self) {
        let path = self.dir.path().to_path_buf();
        let dir = self.dir;
        match tokio::task::spawn_blocking(move || dir.close()).await {
            Ok(Ok(())) => debug!(workspace = %path.display(), "Removed workspace"),
            Ok(Err(err)) => warn!(
                workspace = %path.display(),
                error = %err,
                "Failed to remove workspace"
            ),
            Err(err) => warn!(
                workspace = %path.display(),
                error = %err,
                "Workspace removal did not finish"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unique_and_removed_on_close() {
        let root = tempfile::TempDir::new().unwrap();
        let a = Workspace::create(root.path()).await.unwrap();
        let b = Workspace::create(root.path()).await.unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path()));

        std::fs::write(a.file("composite.tif"), b"data").unwrap();
        let a_path = a.path().to_path_buf();
        a.close().await;
        b.close().await;

        assert!(!a_path.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_creates_missing_temp_root() {
        let root = tempfile::TempDir::new().unwrap();
        let nested = root.path().join("a").join("b");
        let workspace = Workspace::create(&nested).await.unwrap();
        assert!(workspace.path().starts_with(&nested));
    }
}
