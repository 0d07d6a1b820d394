//! `terrastat reproject` and `terrastat zonal`.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use terrastat_db::EnvironmentalIndex;
use terrastat_pipeline::{
    run_task, CommandZonalCalculator, DataDate, DirectoryLayout, FsLayout, GdalCliTransform,
    PipelineConfig, PipelineError, RasterTransform, ReprojectTask, Task, TaskOutcome,
    ZonalCalculator, ZonalStatsTask,
};
use tracing::info;

pub async fn reproject(config: &PipelineConfig, project: &str, date: &str, force: bool) -> Result<()> {
    let project = Arc::new(config.project(project)?.clone());
    let date = parse_date(date)?;
    let layout: Arc<dyn DirectoryLayout> = Arc::new(FsLayout::from_config(config));
    let transform: Arc<dyn RasterTransform> = Arc::new(GdalCliTransform::new(config.gdal.clone()));

    let task = ReprojectTask::new(project, date, layout, transform);
    execute(&task, force).await
}

pub async fn zonal(
    config: &PipelineConfig,
    project: &str,
    date: &str,
    index: &str,
    force: bool,
) -> Result<()> {
    let project = Arc::new(config.project(project)?.clone());
    let date = parse_date(date)?;
    let index: EnvironmentalIndex = index.parse().map_err(|e: String| anyhow!(e))?;
    let program = config.zonal.program.clone().ok_or_else(|| {
        PipelineError::configuration("zonal.program is not set; no zonal calculator available")
    })?;
    let db = config.db_config()?;

    let layout: Arc<dyn DirectoryLayout> = Arc::new(FsLayout::from_config(config));
    let calculator: Arc<dyn ZonalCalculator> = Arc::new(CommandZonalCalculator::new(program));
    let task = ZonalStatsTask::new(project, date, index, layout, calculator, db);
    execute(&task, force).await
}

fn parse_date(date: &str) -> Result<DataDate> {
    date.parse::<DataDate>().map_err(|e| anyhow!(e))
}

async fn execute(task: &dyn Task, force: bool) -> Result<()> {
    let outcome = if force {
        info!(task = %task.name(), "Forced run, ignoring completion marker");
        task.run()
            .await
            .with_context(|| format!("Task failed: {}", task.name()))?;
        None
    } else {
        Some(
            run_task(task)
                .await
                .with_context(|| format!("Task failed: {}", task.name()))?,
        )
    };

    match outcome {
        Some(TaskOutcome::Skipped) => println!("Skipped (already completed): {}", task.name()),
        Some(TaskOutcome::Completed { elapsed }) => {
            println!("Completed in {:.1}s: {}", elapsed.as_secs_f64(), task.name())
        }
        None => println!("Completed: {}", task.name()),
    }
    Ok(())
}
