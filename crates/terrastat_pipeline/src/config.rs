//! Pipeline configuration (`config.toml`).
//!
//! ```toml
//! data_root = "/srv/terrastat/data"
//! temp_root = "/srv/terrastat/tmp"
//! settings_root = "/srv/terrastat/settings"
//!
//! [database]
//! url = "postgres://terrastat@db/terrastat"
//!
//! [retry]
//! max_attempts = 16
//!
//! [[projects]]
//! name = "ga_aea"
//! shapefiles = ["counties.shp"]
//! projection = { target_srs = "EPSG:5070", pixel_size = 250.0 }
//! ```

use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use terrastat_db::{DbConfig, RetryPolicy, SchemaName, MAX_IDENTIFIER_LEN};

use crate::error::{PipelineError, Result};
use crate::project::ProjectInfo;

/// Everything a task needs besides the (project, date) it runs for.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Downloads, reprojected rasters and completion markers
    pub data_root: PathBuf,
    /// Parent of per-run workspaces
    pub temp_root: PathBuf,
    /// Per-project settings directories (shapefiles live here)
    pub settings_root: PathBuf,

    #[serde(default)]
    pub database: DbConfig,

    /// Serialization conflict retries; replaces `database.retry` when present
    #[serde(default)]
    pub retry: Option<RetryPolicy>,

    #[serde(default)]
    pub gdal: GdalConfig,

    #[serde(default)]
    pub zonal: ZonalConfig,

    #[serde(default)]
    pub projects: Vec<ProjectInfo>,
}

/// External GDAL programs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GdalConfig {
    #[serde(default = "default_gdal_calc")]
    pub gdal_calc: PathBuf,
    #[serde(default = "default_gdalwarp")]
    pub gdalwarp: PathBuf,
    #[serde(default = "default_ogrinfo")]
    pub ogrinfo: PathBuf,
}

impl Default for GdalConfig {
    fn default() -> Self {
        Self {
            gdal_calc: default_gdal_calc(),
            gdalwarp: default_gdalwarp(),
            ogrinfo: default_ogrinfo(),
        }
    }
}

fn default_gdal_calc() -> PathBuf {
    PathBuf::from("gdal_calc.py")
}

fn default_gdalwarp() -> PathBuf {
    PathBuf::from("gdalwarp")
}

fn default_ogrinfo() -> PathBuf {
    PathBuf::from("ogrinfo")
}

/// Zonal statistics calculator program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZonalConfig {
    /// Invoked as `<program> <raster> <shapefile> <field>`; prints CSV rows
    pub program: Option<PathBuf>,
}

impl PipelineConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io_at("read config", path, e))?;
        Self::from_toml(&text)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(text)
            .map_err(|e| PipelineError::configuration(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every invariant tasks rely on. No I/O.
    pub fn validate(&self) -> Result<()> {
        for (key, root) in [
            ("data_root", &self.data_root),
            ("temp_root", &self.temp_root),
            ("settings_root", &self.settings_root),
        ] {
            if !root.is_absolute() {
                return Err(PipelineError::configuration(format!(
                    "{} must be an absolute path: {}",
                    key,
                    root.display()
                )));
            }
        }

        for (key, retry) in [
            ("retry", self.retry.as_ref()),
            ("database.retry", Some(&self.database.retry)),
        ] {
            if retry.is_some_and(|retry| retry.max_attempts == 0) {
                return Err(PipelineError::configuration(format!(
                    "{}.max_attempts must be at least 1",
                    key
                )));
            }
        }

        let mut names = HashSet::new();
        let mut schemas = HashSet::new();
        for project in &self.projects {
            validate_project(project)?;
            if !names.insert(project.name.as_str()) {
                return Err(PipelineError::configuration(format!(
                    "Duplicate project: {}",
                    project.name
                )));
            }
            let schema = SchemaName::for_project(&project.name);
            if !schema.fits_identifier_limit() {
                return Err(PipelineError::configuration(format!(
                    "Project {} maps to schema {} longer than {} bytes",
                    project.name, schema, MAX_IDENTIFIER_LEN
                )));
            }
            if !schemas.insert(schema.clone()) {
                return Err(PipelineError::configuration(format!(
                    "Project {} maps to schema {} already used by another project",
                    project.name, schema
                )));
            }
        }
        Ok(())
    }

    /// Look up a configured project by exact name.
    pub fn project(&self, name: &str) -> Result<&ProjectInfo> {
        self.projects
            .iter()
            .find(|project| project.name == name)
            .ok_or_else(|| PipelineError::configuration(format!("Unknown project: {}", name)))
    }

    /// Retry policy in effect: top-level `[retry]`, else `database.retry`.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.unwrap_or(self.database.retry)
    }

    /// Store settings with the effective retry policy applied.
    pub fn db_config(&self) -> Result<DbConfig> {
        if self.database.url.trim().is_empty() {
            return Err(PipelineError::configuration("database.url is not set"));
        }
        Ok(self.database.clone().with_retry(self.retry_policy()))
    }
}

fn validate_project(project: &ProjectInfo) -> Result<()> {
    let name = project.name.trim();
    if name.is_empty() {
        return Err(PipelineError::configuration("Project name must not be empty"));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(PipelineError::configuration(format!(
            "Project name must not be a path: {}",
            project.name
        )));
    }
    if project.shapefiles.is_empty() {
        return Err(PipelineError::configuration(format!(
            "Project {} has no shapefiles",
            project.name
        )));
    }
    let pixel_size = project.projection.pixel_size;
    if !pixel_size.is_finite() || pixel_size <= 0.0 {
        return Err(PipelineError::configuration(format!(
            "Project {} has invalid pixel size {}",
            project.name, pixel_size
        )));
    }
    if project.projection.target_srs.trim().is_empty() {
        return Err(PipelineError::configuration(format!(
            "Project {} has no target_srs",
            project.name
        )));
    }
    for zone_field in &project.zone_fields {
        if zone_field.field.trim().is_empty() {
            return Err(PipelineError::configuration(format!(
                "Project {} has a zone field without a field name",
                project.name
            )));
        }
    }
    Ok(())
}
