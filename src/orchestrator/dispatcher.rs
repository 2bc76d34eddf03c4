use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::gate::GatePermit;
use crate::backend::{ExtractionJob, Extractor, ProgressEvent};
use crate::observability::Metrics;
use crate::storage;
use crate::tasks::{ProgressRecord, TaskId, TaskStatus, TaskStore};

pub const NO_OUTPUT_MESSAGE: &str = "no output file produced";
pub const PANIC_MESSAGE: &str = "extraction worker panicked";

/// Result of the blocking half of a dispatch
enum WorkerOutcome {
    Produced {
        title: Option<String>,
        artifact: PathBuf,
    },
    Failed(String),
}

fn run_worker(
    store: &TaskStore,
    extractor: &dyn Extractor,
    task_id: TaskId,
    job: &ExtractionJob,
) -> WorkerOutcome {
    let mut on_progress = |event: ProgressEvent| {
        if store.update(&task_id, |record| record.apply_event(&event)).is_none() {
            debug!(%task_id, "Progress for a removed task");
        }
    };

    let outcome = match extractor.extract(job, &mut on_progress) {
        Ok(outcome) => outcome,
        Err(e) => return WorkerOutcome::Failed(e.to_string()),
    };

    match storage::find_artifact(&job.output_dir) {
        Ok(Some(artifact)) => WorkerOutcome::Produced {
            title: outcome.title,
            artifact,
        },
        Ok(None) => WorkerOutcome::Failed(NO_OUTPUT_MESSAGE.to_string()),
        Err(e) => WorkerOutcome::Failed(format!("failed to scan output directory: {e}")),
    }
}

fn finalize(record: &mut ProgressRecord, outcome: WorkerOutcome) {
    // A backend that reported an error event but still returned keeps its error.
    if record.is_terminal() {
        return;
    }

    let result = match outcome {
        WorkerOutcome::Produced { title, artifact } => {
            if title.is_some() {
                record.title = title;
            }
            record.complete(artifact)
        }
        WorkerOutcome::Failed(message) => record.fail(message),
    };

    if let Err(e) = result {
        debug!(task_id = %record.task_id, error = %e, "Final transition rejected");
        let _ = record.fail(e.to_string());
    }
}

/// Runs one extraction on the blocking pool and records its terminal state.
///
/// The permit is released only after the final assignment is recorded. Returns the final
/// snapshot, or `None` if the task was deleted while it ran.
pub(crate) async fn dispatch(
    store: Arc<TaskStore>,
    extractor: Arc<dyn Extractor>,
    metrics: Arc<Metrics>,
    task_id: TaskId,
    job: ExtractionJob,
    permit: GatePermit,
) -> Option<ProgressRecord> {
    debug!(%task_id, url = %job.url, "Dispatching extraction");

    let worker_store = store.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        run_worker(&worker_store, extractor.as_ref(), task_id, &job)
    })
    .await
    .unwrap_or_else(|e| {
        if e.is_panic() {
            WorkerOutcome::Failed(PANIC_MESSAGE.to_string())
        } else {
            WorkerOutcome::Failed(format!("extraction worker cancelled: {e}"))
        }
    });

    let snapshot = store.update(&task_id, |record| {
        finalize(record, outcome);
        record.clone()
    });

    match &snapshot {
        Some(record) if record.status == TaskStatus::Completed => {
            metrics.task_completed();
            info!(
                %task_id,
                filename = %record.filename,
                "Download completed"
            );
        }
        Some(record) => {
            metrics.task_failed();
            warn!(
                %task_id,
                error = record.error.as_deref().unwrap_or_default(),
                "Download failed"
            );
        }
        None => debug!(%task_id, "Task removed before completion"),
    }
    drop(permit);

    snapshot
}
