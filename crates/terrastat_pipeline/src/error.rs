//! Pipeline error taxonomy.

use std::io;
use std::path::Path;
use terrastat_db::DbError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors surfaced by tasks and their collaborators.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid or missing configuration, raised before any I/O
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Project store failure (connection, constraint, exhausted retries)
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// External raster transform failed
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Filesystem failure, with what was being attempted
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Completion marker or upstream metadata could not be (de)serialized
    #[error("Marker error: {0}")]
    Marker(#[from] serde_json::Error),

    /// Blocking filesystem work panicked or was cancelled
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// I/O error about a specific path.
    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Self::io(format!("Failed to {} {}", action, path.display()), source)
    }
}

/// Failures of the raster transform collaborators.
#[derive(Error, Debug)]
pub enum TransformError {
    /// External program could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// External program exited unsuccessfully
    #[error("{program} failed ({status}): {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// Program output could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Request the transform cannot satisfy
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Staging or renaming output files failed
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl TransformError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn io_at(action: &str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            context: format!("Failed to {} {}", action, path.display()),
            source,
        }
    }
}
