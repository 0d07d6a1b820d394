//! Per-project settings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A configured project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectInfo {
    pub name: String,
    /// Reference shapefiles, relative to the project settings directory.
    /// Their combined extent bounds every reprojected raster.
    pub shapefiles: Vec<PathBuf>,
    pub projection: ProjectionParams,
    /// Zone fields summarized by the statistics pipeline
    #[serde(default)]
    pub zone_fields: Vec<ZoneFieldSpec>,
}

/// Output grid parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectionParams {
    /// Target spatial reference (anything `gdalwarp -t_srs` accepts)
    pub target_srs: String,
    /// Spatial reference assumed for inputs that carry none
    #[serde(default)]
    pub source_srs: Option<String>,
    /// Pixel edge length in target units
    pub pixel_size: f64,
    #[serde(default)]
    pub resampling: Resampling,
}

/// Resampling kernel used when warping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    Near,
    Bilinear,
    #[default]
    Cubic,
    CubicSpline,
    Average,
}

impl Resampling {
    /// Name understood by `gdalwarp -r`.
    pub fn as_gdal(self) -> &'static str {
        match self {
            Resampling::Near => "near",
            Resampling::Bilinear => "bilinear",
            Resampling::Cubic => "cubic",
            Resampling::CubicSpline => "cubicspline",
            Resampling::Average => "average",
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_gdal())
    }
}

/// Shapefile attribute whose values name the zones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneFieldSpec {
    pub shapefile: PathBuf,
    pub field: String,
}

impl ZoneFieldSpec {
    /// Dimension key as stored: the shapefile path as configured, and the field.
    pub fn key(&self) -> terrastat_db::ZoneFieldKey {
        terrastat_db::ZoneFieldKey::new(self.shapefile.to_string_lossy(), self.field.clone())
    }
}
