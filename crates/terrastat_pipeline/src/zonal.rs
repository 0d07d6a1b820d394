//! Zonal statistics of a reprojected raster, recorded in the project store.

use async_trait::async_trait;
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use terrastat_db::{
    DbConfig, EnvironmentalIndex, FactKey, ProjectDb, ZonalStatRecord, ZonalStats,
};
use tracing::{debug, info, warn};

use crate::date::DataDate;
use crate::error::{PipelineError, Result, TransformError};
use crate::layout::DirectoryLayout;
use crate::marker::{marker_is_valid, CompletionMarker};
use crate::process::run_program;
use crate::project::ProjectInfo;
use crate::task::Task;

/// Statistics of one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSummary {
    pub zone: String,
    pub stats: ZonalStats,
}

/// Computes per-zone summaries of a raster.
#[async_trait]
pub trait ZonalCalculator: Send + Sync {
    /// One summary per distinct value of `field` in `shapefile`.
    async fn summarize(
        &self,
        raster: &Path,
        shapefile: &Path,
        field: &str,
    ) -> std::result::Result<Vec<ZoneSummary>, TransformError>;
}

// ============================================================================
// Task
// ============================================================================

/// Records zonal statistics of one index for one project and date.
///
/// Requires the reprojection stage's marker. Opens its own store connection
/// for the run; re-running overwrites the recorded facts in place.
pub struct ZonalStatsTask {
    project: Arc<ProjectInfo>,
    date: DataDate,
    index: EnvironmentalIndex,
    layout: Arc<dyn DirectoryLayout>,
    calculator: Arc<dyn ZonalCalculator>,
    db: DbConfig,
}

impl ZonalStatsTask {
    pub fn new(
        project: Arc<ProjectInfo>,
        date: DataDate,
        index: EnvironmentalIndex,
        layout: Arc<dyn DirectoryLayout>,
        calculator: Arc<dyn ZonalCalculator>,
        db: DbConfig,
    ) -> Self {
        Self {
            project,
            date,
            index,
            layout,
            calculator,
            db,
        }
    }

    pub fn marker_file(&self) -> PathBuf {
        self.layout.zonal_marker(&self.project, self.index, self.date)
    }

    fn fact_key(&self) -> FactKey {
        FactKey {
            index: self.index,
            year: self.date.year(),
            day: self.date.day_of_year() as i32,
        }
    }

    async fn record_all(&self, db: &mut ProjectDb, raster: &Path) -> Result<usize> {
        let settings_dir = self.layout.settings_dir(&self.project);
        let key = self.fact_key();
        let mut recorded = 0;

        for spec in &self.project.zone_fields {
            let shapefile = settings_dir.join(&spec.shapefile);
            let summaries = self
                .calculator
                .summarize(raster, &shapefile, &spec.field)
                .await?;
            debug!(
                shapefile = %spec.shapefile.display(),
                field = %spec.field,
                zones = summaries.len(),
                "Zonal summaries computed"
            );

            let zone_field = spec.key();
            for summary in summaries {
                let record = ZonalStatRecord {
                    zone_field: zone_field.clone(),
                    zone: summary.zone,
                    key,
                    stats: summary.stats,
                };
                db.upsert_zonal_stat(&record).await?;
                recorded += 1;
            }
        }
        Ok(recorded)
    }
}

#[async_trait]
impl Task for ZonalStatsTask {
    fn name(&self) -> String {
        format!(
            "Zonal statistics: project=\"{}\", index={}, date={}",
            self.project.name, self.index, self.date
        )
    }

    fn can_skip(&self) -> bool {
        marker_is_valid(&self.marker_file())
    }

    async fn run(&self) -> Result<()> {
        if self.project.zone_fields.is_empty() {
            return Err(PipelineError::configuration(format!(
                "Project {} has no zone fields",
                self.project.name
            )));
        }

        let marker_path = self.marker_file();
        match tokio::fs::remove_file(&marker_path).await {
            Ok(()) => debug!(marker = %marker_path.display(), "Removed previous marker"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(PipelineError::io_at("remove previous marker", &marker_path, err)),
        }

        let upstream_path = self
            .layout
            .reprojected_marker(&self.project, self.index, self.date);
        let upstream = CompletionMarker::load(&upstream_path).await?;
        let raster = self
            .layout
            .reprojected_file(&self.project, self.index, self.date);

        let mut db = ProjectDb::connect(&self.db, &self.project.name).await?;
        let recorded = self.record_all(&mut db, &raster).await;
        if let Err(err) = db.close().await {
            warn!(error = %err, "Failed to close store connection");
        }
        let recorded = recorded?;

        CompletionMarker::now(serde_json::to_value(&upstream)?)
            .store(&marker_path)
            .await?;
        info!(
            project = %self.project.name,
            index = %self.index,
            date = %self.date,
            recorded,
            "Zonal statistics recorded"
        );
        Ok(())
    }
}

// ============================================================================
// External calculator
// ============================================================================

/// Runs `<program> <raster> <shapefile> <field>` and reads CSV from its
/// stdout: a `zone,count,sum,mean,stdev` header, then one row per zone.
/// Zone names containing commas are quoted.
#[derive(Debug, Clone)]
pub struct CommandZonalCalculator {
    program: PathBuf,
}

impl CommandZonalCalculator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl ZonalCalculator for CommandZonalCalculator {
    async fn summarize(
        &self,
        raster: &Path,
        shapefile: &Path,
        field: &str,
    ) -> std::result::Result<Vec<ZoneSummary>, TransformError> {
        let args: Vec<OsString> = vec![
            raster.as_os_str().to_os_string(),
            shapefile.as_os_str().to_os_string(),
            field.into(),
        ];
        let stdout = run_program(&self.program, &args).await?;
        parse_summaries(&stdout)
    }
}

#[derive(Debug, Deserialize)]
struct SummaryRow {
    zone: String,
    count: f64,
    sum: f64,
    mean: f64,
    stdev: f64,
}

pub fn parse_summaries(stdout: &str) -> std::result::Result<Vec<ZoneSummary>, TransformError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(stdout.as_bytes());

    let mut summaries = Vec::new();
    for (idx, row) in reader.deserialize::<SummaryRow>().enumerate() {
        let row = row.map_err(|e: csv::Error| {
            TransformError::parse(format!("Bad zonal summary in row {}: {}", idx + 1, e))
        })?;
        if row.zone.is_empty() {
            return Err(TransformError::parse(format!(
                "Bad zonal summary in row {}: empty zone",
                idx + 1
            )));
        }
        summaries.push(ZoneSummary {
            zone: row.zone,
            stats: ZonalStats {
                count: row.count,
                sum: row.sum,
                mean: row.mean,
                stdev: row.stdev,
            },
        });
    }
    Ok(summaries)
}
