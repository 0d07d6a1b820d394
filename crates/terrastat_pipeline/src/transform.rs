//! Raster transform contract and grid geometry.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::TransformError;
use crate::project::{ProjectionParams, Resampling};

/// Compositing and reprojection backend.
///
/// Implementations write `output` only when they succeed; on error the path
/// holds nothing a reader could mistake for a result.
#[async_trait]
pub trait RasterTransform: Send + Sync {
    /// Per-pixel mean of equally shaped rasters.
    async fn composite(&self, inputs: &[PathBuf], output: &Path) -> Result<(), TransformError>;

    /// Warp `input` onto the grid covering the request's shapefiles.
    async fn project(
        &self,
        input: &Path,
        request: &ProjectionRequest,
        output: &Path,
    ) -> Result<(), TransformError>;
}

/// Everything the projection step needs from a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionRequest {
    pub target_srs: String,
    pub source_srs: Option<String>,
    pub pixel_size: f64,
    pub resampling: Resampling,
    /// Absolute shapefile paths, already in the target SRS
    pub shapefiles: Vec<PathBuf>,
}

impl ProjectionRequest {
    /// Resolve project parameters against the project settings directory.
    pub fn new(params: &ProjectionParams, settings_dir: &Path, shapefiles: &[PathBuf]) -> Self {
        Self {
            target_srs: params.target_srs.clone(),
            source_srs: params.source_srs.clone(),
            pixel_size: params.pixel_size,
            resampling: params.resampling,
            shapefiles: shapefiles.iter().map(|s| settings_dir.join(s)).collect(),
        }
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// Axis-aligned bounding box in target units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

impl Extent {
    pub fn new(left: f64, right: f64, bottom: f64, top: f64) -> Self {
        Self {
            left,
            right,
            bottom,
            top,
        }
    }

    /// Smallest extent containing both. Every edge is widened on its own.
    pub fn union(self, other: Extent) -> Extent {
        Extent {
            left: self.left.min(other.left),
            right: self.right.max(other.right),
            bottom: self.bottom.min(other.bottom),
            top: self.top.max(other.top),
        }
    }

    /// Union of all extents, `None` when there are none.
    pub fn union_all(extents: impl IntoIterator<Item = Extent>) -> Option<Extent> {
        extents.into_iter().reduce(Extent::union)
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }
}

/// Output raster size for an extent and pixel size.
///
/// The grid is anchored at the extent's top-left corner; the last column and
/// row may reach past the right and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputGrid {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_size: f64,
    pub columns: u32,
    pub rows: u32,
}

impl OutputGrid {
    /// `ceil(width / pixel) x ceil(height / pixel)` pixels.
    pub fn covering(extent: Extent, pixel_size: f64) -> Result<Self, TransformError> {
        if !pixel_size.is_finite() || pixel_size <= 0.0 {
            return Err(TransformError::invalid_input(format!(
                "pixel size must be positive, got {}",
                pixel_size
            )));
        }
        let columns = pixel_count(extent.width(), pixel_size, "width")?;
        let rows = pixel_count(extent.height(), pixel_size, "height")?;
        Ok(Self {
            origin_x: extent.left,
            origin_y: extent.top,
            pixel_size,
            columns,
            rows,
        })
    }

    /// Extent actually covered by whole pixels.
    pub fn extent(&self) -> Extent {
        Extent {
            left: self.origin_x,
            right: self.origin_x + f64::from(self.columns) * self.pixel_size,
            bottom: self.origin_y - f64::from(self.rows) * self.pixel_size,
            top: self.origin_y,
        }
    }
}

fn pixel_count(span: f64, pixel_size: f64, what: &str) -> Result<u32, TransformError> {
    if !span.is_finite() || span <= 0.0 {
        return Err(TransformError::invalid_input(format!(
            "extent {} must be positive, got {}",
            what, span
        )));
    }
    let count = (span / pixel_size).ceil();
    if count > f64::from(u32::MAX) {
        return Err(TransformError::invalid_input(format!(
            "extent {} of {} needs too many pixels at size {}",
            what, span, pixel_size
        )));
    }
    Ok(count as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_widens_every_edge_independently() {
        // The second extent is further out on all four sides at once.
        let a = Extent::new(0.0, 10.0, 0.0, 10.0);
        let b = Extent::new(-5.0, 20.0, -3.0, 12.0);
        assert_eq!(a.union(b), Extent::new(-5.0, 20.0, -3.0, 12.0));
    }

    #[test]
    fn test_union_all() {
        let extents = [
            Extent::new(0.0, 1.0, 0.0, 1.0),
            Extent::new(2.0, 3.0, -1.0, 0.5),
            Extent::new(-1.0, 0.0, 0.0, 4.0),
        ];
        assert_eq!(
            Extent::union_all(extents),
            Some(Extent::new(-1.0, 3.0, -1.0, 4.0))
        );
        assert_eq!(Extent::union_all(Vec::new()), None);
    }

    #[test]
    fn test_grid_rounds_up() {
        let extent = Extent::new(1000.0, 1600.0, 0.0, 250.0);
        let grid = OutputGrid::covering(extent, 250.0).unwrap();
        assert_eq!((grid.columns, grid.rows), (3, 1));
        assert_eq!(grid.extent(), Extent::new(1000.0, 1750.0, 0.0, 250.0));
    }

    #[test]
    fn test_grid_anchored_top_left() {
        let extent = Extent::new(0.0, 100.0, 10.0, 110.0);
        let grid = OutputGrid::covering(extent, 30.0).unwrap();
        assert_eq!((grid.columns, grid.rows), (4, 4));
        let covered = grid.extent();
        assert_eq!(covered.top, 110.0);
        assert_eq!(covered.bottom, -10.0);
    }

    #[test]
    fn test_grid_rejects_bad_input() {
        let extent = Extent::new(0.0, 10.0, 0.0, 10.0);
        assert!(OutputGrid::covering(extent, 0.0).is_err());
        assert!(OutputGrid::covering(extent, f64::NAN).is_err());
        assert!(OutputGrid::covering(Extent::new(5.0, 5.0, 0.0, 1.0), 1.0).is_err());
    }

    #[test]
    fn test_request_resolves_shapefiles() {
        let params = ProjectionParams {
            target_srs: "EPSG:5070".to_string(),
            source_srs: Some("EPSG:4269".to_string()),
            pixel_size: 250.0,
            resampling: Resampling::Cubic,
        };
        let request = ProjectionRequest::new(
            &params,
            Path::new("/settings/ga"),
            &[PathBuf::from("counties.shp")],
        );
        assert_eq!(request.shapefiles, vec![PathBuf::from("/settings/ga/counties.shp")]);
        assert_eq!(request.source_srs.as_deref(), Some("EPSG:4269"));
    }
}
