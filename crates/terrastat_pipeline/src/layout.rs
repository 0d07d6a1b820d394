//! Where pipeline artifacts live on disk.

use std::path::{Path, PathBuf};
use terrastat_db::EnvironmentalIndex;

use crate::config::PipelineConfig;
use crate::date::DataDate;
use crate::project::ProjectInfo;

const MARKER_FILE: &str = "metadata.json";

/// Path resolution for inputs, outputs and completion markers.
///
/// A reprojected raster and its marker share one directory, so removing that
/// directory removes a stale marker together with its output.
pub trait DirectoryLayout: Send + Sync {
    /// Daily ETo download for a date.
    fn eto_download_file(&self, date: DataDate) -> PathBuf;

    /// Metadata recorded by the downloader next to the daily file.
    fn eto_download_metadata(&self, date: DataDate) -> PathBuf;

    /// Reprojected raster of an index for a project and date.
    fn reprojected_file(&self, project: &ProjectInfo, index: EnvironmentalIndex, date: DataDate)
        -> PathBuf;

    /// Completion marker of the reprojection stage.
    fn reprojected_marker(
        &self,
        project: &ProjectInfo,
        index: EnvironmentalIndex,
        date: DataDate,
    ) -> PathBuf;

    /// Completion marker of the zonal statistics stage.
    fn zonal_marker(&self, project: &ProjectInfo, index: EnvironmentalIndex, date: DataDate)
        -> PathBuf;

    /// Directory holding a project's shapefiles.
    fn settings_dir(&self, project: &ProjectInfo) -> PathBuf;

    /// Parent directory of per-run workspaces.
    fn temp_root(&self) -> &Path;
}

/// Filesystem layout rooted at the configured directories.
///
/// ```text
/// <data_root>/download/eto/<YYYY>/<DDD>/eto.tif
/// <data_root>/download/eto/<YYYY>/<DDD>/metadata.json
/// <data_root>/projects/<project>/reprojected/<index>/<YYYY>/<DDD>/<index>.tif
/// <data_root>/projects/<project>/reprojected/<index>/<YYYY>/<DDD>/metadata.json
/// <data_root>/projects/<project>/zonal/<index>/<YYYY>/<DDD>/metadata.json
/// <settings_root>/<project>/
/// ```
#[derive(Debug, Clone)]
pub struct FsLayout {
    data_root: PathBuf,
    temp_root: PathBuf,
    settings_root: PathBuf,
}

impl FsLayout {
    pub fn new(
        data_root: impl Into<PathBuf>,
        temp_root: impl Into<PathBuf>,
        settings_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            temp_root: temp_root.into(),
            settings_root: settings_root.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.data_root.clone(),
            config.temp_root.clone(),
            config.settings_root.clone(),
        )
    }

    fn eto_download_dir(&self, date: DataDate) -> PathBuf {
        dated(self.data_root.join("download").join("eto"), date)
    }

    fn project_dir(&self, project: &ProjectInfo) -> PathBuf {
        self.data_root.join("projects").join(&project.name)
    }

    fn reprojected_dir(
        &self,
        project: &ProjectInfo,
        index: EnvironmentalIndex,
        date: DataDate,
    ) -> PathBuf {
        dated(
            self.project_dir(project).join("reprojected").join(index.as_str()),
            date,
        )
    }
}

fn dated(base: PathBuf, date: DataDate) -> PathBuf {
    base.join(format!("{:04}", date.year()))
        .join(format!("{:03}", date.day_of_year()))
}

impl DirectoryLayout for FsLayout {
    fn eto_download_file(&self, date: DataDate) -> PathBuf {
        self.eto_download_dir(date).join("eto.tif")
    }

    fn eto_download_metadata(&self, date: DataDate) -> PathBuf {
        self.eto_download_dir(date).join(MARKER_FILE)
    }

    fn reprojected_file(
        &self,
        project: &ProjectInfo,
        index: EnvironmentalIndex,
        date: DataDate,
    ) -> PathBuf {
        self.reprojected_dir(project, index, date)
            .join(format!("{}.tif", index.as_str()))
    }

    fn reprojected_marker(
        &self,
        project: &ProjectInfo,
        index: EnvironmentalIndex,
        date: DataDate,
    ) -> PathBuf {
        self.reprojected_dir(project, index, date).join(MARKER_FILE)
    }

    fn zonal_marker(
        &self,
        project: &ProjectInfo,
        index: EnvironmentalIndex,
        date: DataDate,
    ) -> PathBuf {
        dated(
            self.project_dir(project).join("zonal").join(index.as_str()),
            date,
        )
        .join(MARKER_FILE)
    }

    fn settings_dir(&self, project: &ProjectInfo) -> PathBuf {
        self.settings_root.join(&project.name)
    }

    fn temp_root(&self) -> &Path {
        &self.temp_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{ProjectionParams, Resampling};

    fn project() -> ProjectInfo {
        ProjectInfo {
            name: "ga_aea".to_string(),
            shapefiles: vec![PathBuf::from("counties.shp")],
            projection: ProjectionParams {
                target_srs: "EPSG:5070".to_string(),
                source_srs: None,
                pixel_size: 250.0,
                resampling: Resampling::Cubic,
            },
            zone_fields: Vec::new(),
        }
    }

    #[test]
    fn test_output_and_marker_share_directory() {
        let layout = FsLayout::new("/data", "/tmp", "/settings");
        let date = DataDate::from_year_day(2010, 5).unwrap();
        let project = project();

        let output = layout.reprojected_file(&project, EnvironmentalIndex::Eto, date);
        let marker = layout.reprojected_marker(&project, EnvironmentalIndex::Eto, date);
        assert_eq!(
            output,
            PathBuf::from("/data/projects/ga_aea/reprojected/eto/2010/005/eto.tif")
        );
        assert_eq!(output.parent(), marker.parent());
    }

    #[test]
    fn test_download_paths() {
        let layout = FsLayout::new("/data", "/tmp", "/settings");
        let date = DataDate::from_year_day(2010, 360).unwrap();
        assert_eq!(
            layout.eto_download_file(date),
            PathBuf::from("/data/download/eto/2010/360/eto.tif")
        );
        assert_eq!(
            layout.eto_download_metadata(date),
            PathBuf::from("/data/download/eto/2010/360/metadata.json")
        );
    }

    #[test]
    fn test_zonal_marker_outside_reprojected_tree() {
        let layout = FsLayout::new("/data", "/tmp", "/settings");
        let date = DataDate::from_year_day(2010, 5).unwrap();
        let marker = layout.zonal_marker(&project(), EnvironmentalIndex::Eto, date);
        assert_eq!(
            marker,
            PathBuf::from("/data/projects/ga_aea/zonal/eto/2010/005/metadata.json")
        );
        assert_eq!(layout.settings_dir(&project()), PathBuf::from("/settings/ga_aea"));
    }
}
