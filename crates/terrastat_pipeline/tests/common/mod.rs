//! Shared fixtures: a temp directory tree and scripted collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use terrastat_db::ZonalStats;
use terrastat_pipeline::{
    DataDate, DirectoryLayout, FsLayout, ProjectInfo, ProjectionParams, ProjectionRequest,
    RasterTransform, Resampling, TransformError, ZonalCalculator, ZoneFieldSpec, ZoneSummary,
    COMPOSITE_DAYS,
};

// ============================================================================
// Directory fixture
// ============================================================================

pub struct Fixture {
    pub root: TempDir,
    pub layout: Arc<FsLayout>,
    pub project: Arc<ProjectInfo>,
    pub date: DataDate,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_project_name("ga_aea")
    }

    pub fn with_project_name(name: &str) -> Self {
        let root = TempDir::new().unwrap();
        let layout = Arc::new(FsLayout::new(
            root.path().join("data"),
            root.path().join("tmp"),
            root.path().join("settings"),
        ));
        let project = Arc::new(ProjectInfo {
            name: name.to_string(),
            shapefiles: vec![PathBuf::from("counties.shp")],
            projection: ProjectionParams {
                target_srs: "EPSG:5070".to_string(),
                source_srs: Some("EPSG:4269".to_string()),
                pixel_size: 250.0,
                resampling: Resampling::Cubic,
            },
            zone_fields: vec![ZoneFieldSpec {
                shapefile: PathBuf::from("counties.shp"),
                field: "FIPS".to_string(),
            }],
        });
        let date = DataDate::from_year_day(2010, 360).unwrap();
        Self {
            root,
            layout,
            project,
            date,
        }
    }

    pub fn layout(&self) -> Arc<dyn DirectoryLayout> {
        self.layout.clone()
    }

    pub fn temp_root(&self) -> &Path {
        self.layout.temp_root()
    }

    /// Write the eight daily inputs and the download metadata.
    pub fn seed_downloads(&self) {
        for offset in 0..COMPOSITE_DAYS {
            let path = self.layout.eto_download_file(self.date.next(offset));
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, format!("eto day {}", offset)).unwrap();
        }
        let metadata = self.layout.eto_download_metadata(self.date);
        std::fs::write(
            &metadata,
            serde_json::to_vec(&json!({ "source": "ftp://eto", "bytes": 1024 })).unwrap(),
        )
        .unwrap();
    }

    /// Entries left under the temp root (workspaces that were not removed).
    pub fn leftover_workspaces(&self) -> usize {
        match std::fs::read_dir(self.temp_root()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// ============================================================================
// Scripted raster transform
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Nothing,
    Composite,
    Project,
}

#[derive(Debug, Default)]
pub struct Calls {
    pub composite_inputs: Vec<Vec<PathBuf>>,
    pub composite_outputs: Vec<PathBuf>,
    pub requests: Vec<ProjectionRequest>,
}

/// Writes small text files instead of rasters.
pub struct FakeTransform {
    fail_at: FailAt,
    pub calls: Mutex<Calls>,
}

impl FakeTransform {
    pub fn new(fail_at: FailAt) -> Arc<Self> {
        Arc::new(Self {
            fail_at,
            calls: Mutex::new(Calls::default()),
        })
    }

    pub fn composite_count(&self) -> usize {
        self.calls.lock().unwrap().composite_outputs.len()
    }
}

#[async_trait]
impl RasterTransform for FakeTransform {
    async fn composite(&self, inputs: &[PathBuf], output: &Path) -> Result<(), TransformError> {
        {
            let mut calls = self.calls.lock().unwrap();
            calls.composite_inputs.push(inputs.to_vec());
            calls.composite_outputs.push(output.to_path_buf());
        }
        if self.fail_at == FailAt::Composite {
            return Err(TransformError::Failed {
                program: "gdal_calc.py".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }
        for input in inputs {
            if !input.exists() {
                return Err(TransformError::invalid_input(format!(
                    "missing input {}",
                    input.display()
                )));
            }
        }
        std::fs::write(output, format!("mean of {}", inputs.len())).unwrap();
        Ok(())
    }

    async fn project(
        &self,
        input: &Path,
        request: &ProjectionRequest,
        output: &Path,
    ) -> Result<(), TransformError> {
        self.calls.lock().unwrap().requests.push(request.clone());
        if self.fail_at == FailAt::Project {
            return Err(TransformError::Failed {
                program: "gdalwarp".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "scripted failure".to_string(),
            });
        }
        let composite = std::fs::read_to_string(input).unwrap();
        std::fs::write(output, format!("projected {}", composite)).unwrap();
        Ok(())
    }
}

// ============================================================================
// Scripted zonal calculator
// ============================================================================

/// Returns the same two zones for every call, scaled by `factor`.
pub struct FakeCalculator {
    pub factor: f64,
}

#[async_trait]
impl ZonalCalculator for FakeCalculator {
    async fn summarize(
        &self,
        raster: &Path,
        _shapefile: &Path,
        _field: &str,
    ) -> Result<Vec<ZoneSummary>, TransformError> {
        if !raster.exists() {
            return Err(TransformError::invalid_input("raster missing"));
        }
        Ok(["46011", "46013"]
            .iter()
            .map(|zone| ZoneSummary {
                zone: zone.to_string(),
                stats: ZonalStats {
                    count: 4.0,
                    sum: 4.0 * self.factor,
                    mean: self.factor,
                    stdev: 0.0,
                },
            })
            .collect())
    }
}
