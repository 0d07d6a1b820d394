//! Idempotent pipeline tasks.
//!
//! A [`Task`] covers one (project, date) key. Its completion marker alone
//! tells an orchestrator the work is done; `run` stages intermediates in a
//! private [`Workspace`], drives a [`RasterTransform`] and writes the marker
//! last.
//!
//! - [`ReprojectTask`]: 8-day ETo composite reprojected onto a project grid
//! - [`ZonalStatsTask`]: per-zone statistics of a reprojected raster,
//!   recorded through `terrastat_db`

pub mod config;
pub mod date;
pub mod error;
pub mod gdal;
pub mod layout;
pub mod marker;
mod process;
pub mod project;
pub mod reproject;
pub mod task;
pub mod transform;
pub mod workspace;
pub mod zonal;

pub use config::{GdalConfig, PipelineConfig, ZonalConfig};
pub use date::DataDate;
pub use error::{PipelineError, Result, TransformError};
pub use gdal::GdalCliTransform;
pub use layout::{DirectoryLayout, FsLayout};
pub use marker::CompletionMarker;
pub use project::{ProjectInfo, ProjectionParams, Resampling, ZoneFieldSpec};
pub use reproject::{ReprojectTask, COMPOSITE_DAYS};
pub use task::{run_task, Task, TaskOutcome};
pub use transform::{Extent, OutputGrid, ProjectionRequest, RasterTransform};
pub use workspace::Workspace;
pub use zonal::{CommandZonalCalculator, ZonalCalculator, ZonalStatsTask, ZoneSummary};
