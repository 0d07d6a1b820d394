//! [`RasterTransform`] backed by the GDAL command-line tools.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::GdalConfig;
use crate::error::TransformError;
use crate::process::run_program;
use crate::transform::{Extent, OutputGrid, ProjectionRequest, RasterTransform};

/// `gdal_calc.py` names its inputs `-A` through `-Z`.
const CALC_BANDS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Drives `gdal_calc.py`, `ogrinfo` and `gdalwarp`.
#[derive(Debug, Clone)]
pub struct GdalCliTransform {
    config: GdalConfig,
}

impl GdalCliTransform {
    pub fn new(config: GdalConfig) -> Self {
        Self { config }
    }

    /// Extent of every layer in a shapefile, combined.
    pub async fn shapefile_extent(&self, shapefile: &Path) -> Result<Extent, TransformError> {
        let args: Vec<OsString> = vec![
            "-ro".into(),
            "-so".into(),
            "-al".into(),
            shapefile.as_os_str().to_os_string(),
        ];
        let stdout = run_program(&self.config.ogrinfo, &args).await?;
        let extents = parse_ogrinfo_extents(&stdout)?;
        Extent::union_all(extents).ok_or_else(|| {
            TransformError::parse(format!("ogrinfo reported no extent for {}", shapefile.display()))
        })
    }
}

#[async_trait]
impl RasterTransform for GdalCliTransform {
    async fn composite(&self, inputs: &[PathBuf], output: &Path) -> Result<(), TransformError> {
        let partial = partial_path(output);
        let args = calc_mean_args(inputs, &partial)?;
        let result = run_program(&self.config.gdal_calc, &args).await;
        finish_partial(result, &partial, output).await?;
        debug!(inputs = inputs.len(), output = %output.display(), "Composited rasters");
        Ok(())
    }

    async fn project(
        &self,
        input: &Path,
        request: &ProjectionRequest,
        output: &Path,
    ) -> Result<(), TransformError> {
        if request.shapefiles.is_empty() {
            return Err(TransformError::invalid_input(
                "projection needs at least one shapefile",
            ));
        }

        let mut extents = Vec::with_capacity(request.shapefiles.len());
        for shapefile in &request.shapefiles {
            extents.push(self.shapefile_extent(shapefile).await?);
        }
        let extent = Extent::union_all(extents)
            .ok_or_else(|| TransformError::invalid_input("no shapefile extents"))?;
        let grid = OutputGrid::covering(extent, request.pixel_size)?;

        let partial = partial_path(output);
        let args = warp_args(input, request, &grid, &partial);
        let result = run_program(&self.config.gdalwarp, &args).await;
        finish_partial(result, &partial, output).await?;

        info!(
            output = %output.display(),
            columns = grid.columns,
            rows = grid.rows,
            pixel_size = grid.pixel_size,
            "Reprojected raster"
        );
        Ok(())
    }
}

// ============================================================================
// Argument construction
// ============================================================================

fn calc_mean_args(inputs: &[PathBuf], output: &Path) -> Result<Vec<OsString>, TransformError> {
    if inputs.is_empty() || inputs.len() > CALC_BANDS.len() {
        return Err(TransformError::invalid_input(format!(
            "composite takes 1 to {} inputs, got {}",
            CALC_BANDS.len(),
            inputs.len()
        )));
    }

    let bands: Vec<char> = CALC_BANDS[..inputs.len()].iter().map(|&b| b as char).collect();
    let sum = bands
        .iter()
        .map(|band| band.to_string())
        .collect::<Vec<_>>()
        .join("+");

    let mut args: Vec<OsString> = Vec::new();
    for (band, input) in bands.iter().zip(inputs) {
        args.push(format!("-{}", band).into());
        args.push(input.as_os_str().to_os_string());
    }
    args.push(format!("--calc=({})/{}.0", sum, inputs.len()).into());
    args.push(outfile_arg(output));
    args.push("--type=Float32".into());
    args.push("--format=GTiff".into());
    args.push("--overwrite".into());
    args.push("--quiet".into());
    Ok(args)
}

fn outfile_arg(output: &Path) -> OsString {
    let mut arg = OsString::from("--outfile=");
    arg.push(output.as_os_str());
    arg
}

fn warp_args(
    input: &Path,
    request: &ProjectionRequest,
    grid: &OutputGrid,
    output: &Path,
) -> Vec<OsString> {
    let extent = grid.extent();
    let mut args: Vec<OsString> = vec!["-overwrite".into(), "-of".into(), "GTiff".into()];
    if let Some(source_srs) = &request.source_srs {
        args.push("-s_srs".into());
        args.push(source_srs.into());
    }
    args.push("-t_srs".into());
    args.push(request.target_srs.clone().into());
    args.push("-te".into());
    for edge in [extent.left, extent.bottom, extent.right, extent.top] {
        args.push(edge.to_string().into());
    }
    args.push("-tr".into());
    args.push(grid.pixel_size.to_string().into());
    args.push(grid.pixel_size.to_string().into());
    args.push("-r".into());
    args.push(request.resampling.as_gdal().into());
    args.push("-ot".into());
    args.push("Float32".into());
    args.push(input.as_os_str().to_os_string());
    args.push(output.as_os_str().to_os_string());
    args
}

// ============================================================================
// Output staging
// ============================================================================

/// Hidden sibling the tool writes to before the final rename.
fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    output.with_file_name(format!(".{}.partial", name))
}

/// Rename a finished partial into place, or discard it after a failure.
async fn finish_partial(
    result: Result<String, TransformError>,
    partial: &Path,
    output: &Path,
) -> Result<(), TransformError> {
    if let Err(err) = result {
        discard(partial).await;
        return Err(err);
    }
    if let Err(err) = tokio::fs::rename(partial, output).await {
        discard(partial).await;
        return Err(TransformError::io_at("move finished raster to", output, err));
    }
    Ok(())
}

async fn discard(partial: &Path) {
    match tokio::fs::remove_file(partial).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %partial.display(), error = %err, "Failed to remove partial output"),
    }
}

// ============================================================================
// ogrinfo output
// ============================================================================

/// Every `Extent: (minx, miny) - (maxx, maxy)` line of `ogrinfo -so` output.
pub fn parse_ogrinfo_extents(stdout: &str) -> Result<Vec<Extent>, TransformError> {
    stdout
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("Extent:"))
        .map(parse_extent_line)
        .collect()
}

fn parse_extent_line(rest: &str) -> Result<Extent, TransformError> {
    let bad = || TransformError::parse(format!("Unrecognized ogrinfo extent: {}", rest.trim()));

    let (min, max) = rest.split_once(") - (").ok_or_else(bad)?;
    let (min_x, min_y) = parse_pair(min.trim().trim_start_matches('(')).ok_or_else(bad)?;
    let (max_x, max_y) = parse_pair(max.trim().trim_end_matches(')')).ok_or_else(bad)?;
    Ok(Extent::new(min_x, max_x, min_y, max_y))
}

fn parse_pair(text: &str) -> Option<(f64, f64)> {
    let (x, y) = text.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Resampling;

    const OGRINFO: &str = "INFO: Open of `counties.shp'\n      using driver `ESRI Shapefile' successful.\n\nLayer name: counties\nGeometry: Polygon\nFeature Count: 159\nExtent: (939223.546100, 867925.188100) - (1419547.920700, 1396547.377000)\nLayer SRS WKT:\nPROJCRS[\"NAD83 / Conus Albers\"]\nFIPS: String (5.0)\n";

    #[test]
    fn test_parse_ogrinfo_extent() {
        let extents = parse_ogrinfo_extents(OGRINFO).unwrap();
        assert_eq!(
            extents,
            vec![Extent::new(939223.5461, 1419547.9207, 867925.1881, 1396547.377)]
        );
    }

    #[test]
    fn test_parse_ogrinfo_multiple_layers_and_negatives() {
        let stdout = "Extent: (-85.6, 30.3) - (-80.8, 35.0)\nExtent: (-90.0, 29.0) - (-84.0, 31.0)\n";
        let extents = parse_ogrinfo_extents(stdout).unwrap();
        assert_eq!(extents.len(), 2);
        assert_eq!(
            Extent::union_all(extents),
            Some(Extent::new(-90.0, -80.8, 29.0, 35.0))
        );
    }

    #[test]
    fn test_parse_ogrinfo_garbage() {
        assert!(parse_ogrinfo_extents("Extent: unknown").is_err());
        assert_eq!(parse_ogrinfo_extents("no extent here").unwrap(), Vec::new());
    }

    #[test]
    fn test_calc_mean_args() {
        let inputs: Vec<PathBuf> = (0..8).map(|i| PathBuf::from(format!("/d/{}.tif", i))).collect();
        let args = calc_mean_args(&inputs, Path::new("/w/composite.tif")).unwrap();
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        assert_eq!(&args[..4], ["-A", "/d/0.tif", "-B", "/d/1.tif"]);
        assert!(args.contains(&"--calc=(A+B+C+D+E+F+G+H)/8.0".to_string()));
        assert!(args.contains(&"--outfile=/w/composite.tif".to_string()));
        assert!(calc_mean_args(&[], Path::new("/w/x.tif")).is_err());
    }

    #[test]
    fn test_warp_args() {
        let request = ProjectionRequest {
            target_srs: "EPSG:5070".to_string(),
            source_srs: Some("EPSG:4269".to_string()),
            pixel_size: 250.0,
            resampling: Resampling::Cubic,
            shapefiles: vec![PathBuf::from("/s/a.shp")],
        };
        let grid = OutputGrid::covering(Extent::new(0.0, 600.0, 0.0, 500.0), 250.0).unwrap();
        let args = warp_args(Path::new("/w/in.tif"), &request, &grid, Path::new("/o/out.tif"));
        let joined = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");

        assert_eq!(
            joined,
            "-overwrite -of GTiff -s_srs EPSG:4269 -t_srs EPSG:5070 -te 0 0 750 500 \
             -tr 250 250 -r cubic -ot Float32 /w/in.tif /o/out.tif"
        );
    }

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        assert_eq!(
            partial_path(Path::new("/o/eto.tif")),
            PathBuf::from("/o/.eto.tif.partial")
        );
    }
}
