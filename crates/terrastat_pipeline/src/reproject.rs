//! Eight-day ETo composite, reprojected onto a project's grid.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use terrastat_db::EnvironmentalIndex;
use tracing::{debug, info, warn};

use crate::date::DataDate;
use crate::error::{PipelineError, Result};
use crate::layout::DirectoryLayout;
use crate::marker::{marker_is_valid, read_upstream_metadata, CompletionMarker};
use crate::project::ProjectInfo;
use crate::task::Task;
use crate::transform::{ProjectionRequest, RasterTransform};
use crate::workspace::Workspace;

/// The composite window: the task's date and the seven days after it.
pub const COMPOSITE_DAYS: u32 = 8;

const COMPOSITE_FILE: &str = "composite.tif";

/// Composites the daily ETo rasters of an 8-day window and reprojects the
/// result for one project.
pub struct ReprojectTask {
    project: Arc<ProjectInfo>,
    date: DataDate,
    layout: Arc<dyn DirectoryLayout>,
    transform: Arc<dyn RasterTransform>,
}

impl ReprojectTask {
    pub fn new(
        project: Arc<ProjectInfo>,
        date: DataDate,
        layout: Arc<dyn DirectoryLayout>,
        transform: Arc<dyn RasterTransform>,
    ) -> Self {
        Self {
            project,
            date,
            layout,
            transform,
        }
    }

    pub fn output_file(&self) -> PathBuf {
        self.layout
            .reprojected_file(&self.project, EnvironmentalIndex::Eto, self.date)
    }

    pub fn marker_file(&self) -> PathBuf {
        self.layout
            .reprojected_marker(&self.project, EnvironmentalIndex::Eto, self.date)
    }

    /// Daily inputs of the composite window, in date order.
    pub fn input_files(&self) -> Vec<PathBuf> {
        (0..COMPOSITE_DAYS)
            .map(|offset| self.layout.eto_download_file(self.date.next(offset)))
            .collect()
    }

    /// Steps 3 to 7: everything that happens inside the workspace.
    async fn produce(&self, workspace: &Workspace, output: &Path) -> Result<()> {
        let inputs = self.input_files();
        let composite = workspace.file(COMPOSITE_FILE);
        self.transform.composite(&inputs, &composite).await?;
        debug!(composite = %composite.display(), "Composite ready");

        let request = ProjectionRequest::new(
            &self.project.projection,
            &self.layout.settings_dir(&self.project),
            &self.project.shapefiles,
        );
        self.transform.project(&composite, &request, output).await?;

        remove_file_if_exists(&composite).await?;

        let upstream = read_upstream_metadata(&self.layout.eto_download_metadata(self.date)).await?;
        CompletionMarker::now(upstream)
            .store(&self.marker_file())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Task for ReprojectTask {
    fn name(&self) -> String {
        format!(
            "Composite and reproject ETo: project=\"{}\", date={}",
            self.project.name, self.date
        )
    }

    fn can_skip(&self) -> bool {
        marker_is_valid(&self.marker_file())
    }

    async fn run(&self) -> Result<()> {
        let output = self.output_file();
        let output_dir = output.parent().ok_or_else(|| {
            PipelineError::configuration(format!(
                "Output path has no parent directory: {}",
                output.display()
            ))
        })?;

        // Clears a stale output together with its marker.
        remove_dir_if_exists(output_dir).await?;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| PipelineError::io_at("create output directory", output_dir, e))?;

        let workspace = Workspace::create(self.layout.temp_root()).await?;
        let result = self.produce(&workspace, &output).await;
        workspace.close().await;
        result?;

        info!(
            project = %self.project.name,
            date = %self.date,
            output = %output.display(),
            "Reprojection complete"
        );
        Ok(())
    }
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(dir = %dir.display(), "Removed previous output");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(PipelineError::io_at("remove previous output", dir, err)),
    }
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Intermediate file already gone");
            Ok(())
        }
        Err(err) => Err(PipelineError::io_at("remove intermediate", path, err)),
    }
}
