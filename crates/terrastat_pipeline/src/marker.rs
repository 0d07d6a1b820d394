//! Completion markers.
//!
//! A marker's valid existence alone means its stage finished for a key.
//! Markers are written to a temp file in the target directory, synced and
//! renamed into place, so readers see either nothing or the whole document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{PipelineError, Result};

/// `{ "upstream": ..., "completed_at": "..." }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompletionMarker {
    /// Metadata of whatever the stage consumed, carried verbatim
    pub upstream: Value,
    pub completed_at: DateTime<Utc>,
}

impl CompletionMarker {
    /// Marker stamped with the current time.
    pub fn now(upstream: Value) -> Self {
        Self {
            upstream,
            completed_at: Utc::now(),
        }
    }

    /// Read and parse a marker.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::io_at("read marker", path, e))?;
        let marker = serde_json::from_slice(&bytes)?;
        Ok(marker)
    }

    /// [`read`](Self::read) on the blocking pool.
    pub async fn load(path: &Path) -> Result<Self> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::read(&path)).await?
    }

    /// [`write_atomic`](Self::write_atomic) on the blocking pool.
    pub async fn store(self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || self.write_atomic(&path)).await?
    }

    /// Write the marker atomically, creating the parent directory if needed.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| PipelineError::configuration(format!(
                "Marker path has no parent directory: {}",
                path.display()
            )))?;
        std::fs::create_dir_all(dir)
            .map_err(|e| PipelineError::io_at("create marker directory", dir, e))?;

        let mut json = serde_json::to_vec_pretty(self)?;
        json.push(b'\n');

        let mut temp = NamedTempFile::new_in(dir)
            .map_err(|e| PipelineError::io_at("create temp marker in", dir, e))?;
        temp.write_all(&json)
            .map_err(|e| PipelineError::io_at("write temp marker", temp.path(), e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| PipelineError::io_at("sync temp marker", temp.path(), e))?;
        temp.persist(path)
            .map_err(|e| PipelineError::io_at("rename marker to", path, e.error))?;
        Ok(())
    }
}

/// Read a marker and report whether it is valid. Every failure means "no".
pub fn marker_is_valid(path: &Path) -> bool {
    match CompletionMarker::read(path) {
        Ok(_) => true,
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "No valid completion marker");
            false
        }
    }
}

/// Upstream metadata file as opaque JSON.
pub async fn read_upstream_metadata(path: &Path) -> Result<Value> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| PipelineError::io_at("read upstream metadata", path, e))?;
    let value = serde_json::from_slice(&bytes)?;
    Ok(value)
}
