mod common;

use chrono::Utc;
use common::{file_names, FailAt, FakeTransform, Fixture};
use std::sync::Arc;
use terrastat_pipeline::{
    run_task, CompletionMarker, DirectoryLayout, PipelineError, RasterTransform, ReprojectTask,
    Task, TaskOutcome, TransformError,
};

fn task(fixture: &Fixture, transform: Arc<FakeTransform>) -> ReprojectTask {
    let transform: Arc<dyn RasterTransform> = transform;
    ReprojectTask::new(
        fixture.project.clone(),
        fixture.date,
        fixture.layout(),
        transform,
    )
}

#[test]
fn test_name() {
    let fixture = Fixture::new();
    let task = task(&fixture, FakeTransform::new(FailAt::Nothing));
    assert_eq!(
        task.name(),
        "Composite and reproject ETo: project=\"ga_aea\", date=2010-360"
    );
}

#[test]
fn test_composite_window_is_eight_consecutive_days() {
    let fixture = Fixture::new();
    let task = task(&fixture, FakeTransform::new(FailAt::Nothing));
    let inputs = task.input_files();

    assert_eq!(inputs.len(), 8);
    assert!(inputs[0].ends_with("2010/360/eto.tif"));
    assert!(inputs[5].ends_with("2010/365/eto.tif"));
    assert!(inputs[6].ends_with("2011/001/eto.tif"));
    assert!(inputs[7].ends_with("2011/002/eto.tif"));
}

#[tokio::test]
async fn test_run_produces_output_and_marker() {
    let fixture = Fixture::new();
    fixture.seed_downloads();
    let transform = FakeTransform::new(FailAt::Nothing);
    let task = task(&fixture, transform.clone());
    assert!(!task.can_skip());

    let started = Utc::now();
    task.run().await.unwrap();

    let output = task.output_file();
    let output_dir = output.parent().unwrap();
    assert_eq!(file_names(output_dir), vec!["eto.tif", "metadata.json"]);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "projected mean of 8");

    let marker = CompletionMarker::read(&task.marker_file()).unwrap();
    assert!(marker.completed_at >= started);
    assert_eq!(marker.upstream["source"], "ftp://eto");
    assert!(task.can_skip());

    // Composite staged in the workspace, which is gone afterwards.
    let calls = transform.calls.lock().unwrap();
    assert!(calls.composite_outputs[0].starts_with(fixture.temp_root()));
    assert!(!calls.composite_outputs[0].exists());
    assert_eq!(fixture.leftover_workspaces(), 0);

    let request = &calls.requests[0];
    assert_eq!(request.pixel_size, 250.0);
    assert_eq!(request.target_srs, "EPSG:5070");
    assert!(request.shapefiles[0].ends_with("settings/ga_aea/counties.shp"));
}

#[tokio::test]
async fn test_projection_failure_leaves_no_marker_or_workspace() {
    let fixture = Fixture::new();
    fixture.seed_downloads();
    let task = task(&fixture, FakeTransform::new(FailAt::Project));

    let err = task.run().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Transform(TransformError::Failed { ref program, .. }) if program == "gdalwarp"
    ));
    assert!(!task.marker_file().exists());
    assert!(!task.output_file().exists());
    assert_eq!(fixture.leftover_workspaces(), 0);
    assert!(!task.can_skip());
}

#[tokio::test]
async fn test_failed_rerun_clears_stale_marker() {
    let fixture = Fixture::new();
    fixture.seed_downloads();
    task(&fixture, FakeTransform::new(FailAt::Nothing))
        .run()
        .await
        .unwrap();

    let rerun = task(&fixture, FakeTransform::new(FailAt::Composite));
    assert!(rerun.can_skip());
    assert!(rerun.run().await.is_err());

    assert!(!rerun.marker_file().exists());
    assert!(!rerun.output_file().exists());
    assert!(!rerun.can_skip());
}

#[tokio::test]
async fn test_missing_input_fails_without_marker() {
    let fixture = Fixture::new();
    fixture.seed_downloads();
    std::fs::remove_file(fixture.layout.as_ref().eto_download_file(fixture.date.next(3))).unwrap();
    let task = task(&fixture, FakeTransform::new(FailAt::Nothing));

    let err = task.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Transform(TransformError::InvalidInput(_))));
    assert!(!task.marker_file().exists());
    assert_eq!(fixture.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_missing_upstream_metadata_fails_without_marker() {
    let fixture = Fixture::new();
    fixture.seed_downloads();
    std::fs::remove_file(fixture.layout.as_ref().eto_download_metadata(fixture.date)).unwrap();
    let task = task(&fixture, FakeTransform::new(FailAt::Nothing));

    let err = task.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Io { .. }));
    assert!(!task.marker_file().exists());
    assert_eq!(fixture.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_corrupted_marker_is_not_skippable() {
    let fixture = Fixture::new();
    let task = task(&fixture, FakeTransform::new(FailAt::Nothing));
    let marker = task.marker_file();
    std::fs::create_dir_all(marker.parent().unwrap()).unwrap();

    std::fs::write(&marker, b"{\"upstream\": ").unwrap();
    assert!(!task.can_skip());

    std::fs::write(&marker, b"not json at all").unwrap();
    assert!(!task.can_skip());
}

#[tokio::test]
async fn test_run_task_skips_completed_work() {
    let fixture = Fixture::new();
    fixture.seed_downloads();
    let transform = FakeTransform::new(FailAt::Nothing);
    let task = task(&fixture, transform.clone());

    let first = run_task(&task).await.unwrap();
    assert!(matches!(first, TaskOutcome::Completed { .. }));
    let second = run_task(&task).await.unwrap();
    assert_eq!(second, TaskOutcome::Skipped);
    assert_eq!(transform.composite_count(), 1);
}
