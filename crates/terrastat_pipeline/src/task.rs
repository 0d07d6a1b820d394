//! The unit of work an orchestrator schedules.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};

use crate::error::Result;

/// A metadata-driven, idempotent pipeline step for one key.
///
/// An orchestrator calls [`can_skip`](Task::can_skip) and, when it answers
/// `false`, [`run`](Task::run). A task never decides what to compute.
#[async_trait]
pub trait Task: Send + Sync {
    /// Human-readable identity, used in logs.
    fn name(&self) -> String;

    /// Whether a previous run already completed. Never fails: anything that
    /// prevents confirming completion means `false`.
    fn can_skip(&self) -> bool;

    /// Produce the outputs. Errors propagate unchanged and leave no marker.
    async fn run(&self) -> Result<()>;
}

/// What [`run_task`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Skipped,
    Completed { elapsed: Duration },
}

/// Skip-check, then run, with outcome and duration logged.
pub async fn run_task(task: &dyn Task) -> Result<TaskOutcome> {
    let name = task.name();
    let span = info_span!("task", name = %name);

    async {
        if task.can_skip() {
            info!("Skipping, already completed");
            return Ok(TaskOutcome::Skipped);
        }

        info!("Starting");
        let started = Instant::now();
        match task.run().await {
            Ok(()) => {
                let elapsed = started.elapsed();
                info!(elapsed_ms = elapsed.as_millis() as u64, "Completed");
                Ok(TaskOutcome::Completed { elapsed })
            }
            Err(err) => {
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "Failed"
                );
                Err(err)
            }
        }
    }
    .instrument(span)
    .await
}
