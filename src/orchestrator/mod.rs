//! Download orchestration
//!
//! [`DownloadManager`] is the one long-lived owner of the task store, the
//! execution gate, the task directory layout and the extraction backend. The
//! HTTP layer and the cleanup scheduler both talk to it.
//!
//! A request flows through: record created (`pending`) → directory provisioned
//! (`starting`) → gate permit acquired → extraction on the blocking pool →
//! terminal state recorded → permit released.

pub mod dispatcher;
pub mod gate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{ExtractionJob, Extractor, YtDlpExtractor};
use crate::config::{BackendConfig, Config};
use crate::observability::Metrics;
use crate::storage::{StorageError, TaskDirs};
use crate::tasks::{ProgressRecord, TaskError, TaskId, TaskRequest, TaskStatus, TaskStore};

pub use dispatcher::{NO_OUTPUT_MESSAGE, PANIC_MESSAGE};
pub use gate::{ExecutionGate, GatePermit};

pub const SHUTDOWN_MESSAGE: &str = "download service is shutting down";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("{0}")]
    TaskFailed(String),

    #[error("Task is not ready (status: {0})")]
    NotReady(TaskStatus),

    #[error("Artifact missing for task {0}")]
    ArtifactMissing(TaskId),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Download task failed to run: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Clone)]
pub struct DownloadManager {
    store: Arc<TaskStore>,
    gate: ExecutionGate,
    dirs: TaskDirs,
    backend: Arc<BackendConfig>,
    extractor: Arc<dyn Extractor>,
    metrics: Arc<Metrics>,
}

impl DownloadManager {
    pub fn new(config: &Config, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            store: Arc::new(TaskStore::new()),
            gate: ExecutionGate::new(config.downloads.max_concurrent),
            dirs: TaskDirs::new(config.downloads.root.clone()),
            backend: Arc::new(config.backend.clone()),
            extractor,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Manager driving the configured `yt-dlp` program
    pub fn from_config(config: &Config) -> Self {
        let extractor = YtDlpExtractor::new(config.backend.program.clone());
        Self::new(config, Arc::new(extractor))
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    pub fn dirs(&self) -> &TaskDirs {
        &self.dirs
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Creates the record and its directory; the task is `starting` afterwards.
    async fn prepare(&self, request: TaskRequest) -> Result<(ProgressRecord, ExtractionJob)> {
        let task_id = TaskId::new();
        self.store.create(task_id, request.clone())?;

        let dir = match self.dirs.provision(&task_id).await {
            Ok(dir) => dir,
            Err(e) => {
                self.store.delete(&task_id);
                return Err(e.into());
            }
        };

        let record = self
            .store
            .update(&task_id, |record| {
                record.transition(TaskStatus::Starting).map(|_| record.clone())
            })
            .ok_or(OrchestratorError::NotFound(task_id))??;

        self.metrics.task_accepted();
        info!(
            %task_id,
            url = %request.url,
            format = %request.format,
            quality = %request.quality,
            "Download accepted"
        );

        let job = ExtractionJob::from_request(&self.backend, &request, dir);
        Ok((record, job))
    }

    /// Waits for a permit, then runs the extraction to a terminal state.
    async fn execute(&self, task_id: TaskId, job: ExtractionJob) -> Option<ProgressRecord> {
        let permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                let record = self.store.update(&task_id, |record| {
                    let _ = record.fail(SHUTDOWN_MESSAGE);
                    record.clone()
                });
                if record.is_some() {
                    self.metrics.task_failed();
                }
                return record;
            }
        };

        // Deleted while queued: nothing left to download into.
        if self.store.get(&task_id).is_none() {
            debug!(%task_id, "Task removed before dispatch");
            return None;
        }

        dispatcher::dispatch(
            self.store.clone(),
            self.extractor.clone(),
            self.metrics.clone(),
            task_id,
            job,
            permit,
        )
        .await
    }

    /// Accepts a download and runs it in the background.
    ///
    /// Returns the `starting` snapshot immediately.
    pub async fn start_download(&self, request: TaskRequest) -> Result<ProgressRecord> {
        let (record, job) = self.prepare(request).await?;

        let manager = self.clone();
        let task_id = record.task_id;
        tokio::spawn(async move {
            manager.execute(task_id, job).await;
        });

        Ok(record)
    }

    /// Accepts a download and waits for its terminal state.
    ///
    /// The work runs in its own task, so a caller that stops waiting does not
    /// cancel the extraction, its final update or the permit release.
    pub async fn download(&self, request: TaskRequest) -> Result<ProgressRecord> {
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let (record, job) = manager.prepare(request).await?;
            let task_id = record.task_id;

            manager
                .execute(task_id, job)
                .await
                .ok_or(OrchestratorError::NotFound(task_id))
        });

        handle.await?
    }

    pub fn get_progress(&self, task_id: &TaskId) -> Option<ProgressRecord> {
        self.store.get(task_id)
    }

    /// Path of a completed task's artifact, checked to still exist on disk
    pub fn artifact_path(&self, task_id: &TaskId) -> Result<PathBuf> {
        let record = self
            .store
            .get(task_id)
            .ok_or(OrchestratorError::NotFound(*task_id))?;

        match record.status {
            TaskStatus::Completed => {}
            TaskStatus::Error => {
                return Err(OrchestratorError::TaskFailed(
                    record.error.unwrap_or_else(|| "Download failed".to_string()),
                ));
            }
            status => return Err(OrchestratorError::NotReady(status)),
        }

        match record.file_path {
            Some(path) if path.is_file() => Ok(path),
            _ => Err(OrchestratorError::ArtifactMissing(*task_id)),
        }
    }

    /// Deletes the task's directory, then its record.
    ///
    /// Returns `false` when neither existed. The record survives a failed
    /// directory removal.
    pub async fn cleanup_task(&self, task_id: &TaskId) -> Result<bool> {
        let removed_dir = self.dirs.remove(task_id).await?;
        let removed_record = self.store.delete(task_id);

        if removed_dir || removed_record {
            info!(%task_id, removed_dir, removed_record, "Task cleaned up");
        }
        Ok(removed_dir || removed_record)
    }

    /// Runs [`cleanup_task`](Self::cleanup_task) after `delay`.
    pub fn schedule_cleanup(&self, task_id: TaskId, delay: Duration) {
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = manager.cleanup_task(&task_id).await {
                warn!(%task_id, error = %e, "Deferred cleanup failed");
            }
        });
    }

    /// Stops admitting queued work. Running extractions finish on their own.
    pub fn shutdown(&self) {
        self.gate.close();
        info!(
            in_flight = self.gate.in_flight(),
            "Download manager shut down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MediaFormat, Quality, ScriptedExtractor};
    use tempfile::TempDir;

    fn manager(tmp: &TempDir, extractor: ScriptedExtractor) -> DownloadManager {
        let mut config = Config::default();
        config.downloads.root = tmp.path().to_path_buf();
        DownloadManager::new(&config, Arc::new(extractor))
    }

    fn request() -> TaskRequest {
        TaskRequest {
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            format: MediaFormat::Audio,
            quality: Quality::Best,
        }
    }

    #[tokio::test]
    async fn test_download_waits_for_completion() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp, ScriptedExtractor::completing("song.mp3", b"ID3".to_vec()));

        let record = manager.download(request()).await.unwrap();
        assert_eq!(record.status, TaskStatus::Completed);

        let path = manager.artifact_path(&record.task_id).unwrap();
        assert_eq!(path, tmp.path().join(record.task_id.to_string()).join("song.mp3"));
        assert_eq!(manager.metrics().snapshot().tasks_accepted, 1);
    }

    #[tokio::test]
    async fn test_artifact_path_statuses() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp, ScriptedExtractor::new().failing("boom"));

        assert!(matches!(
            manager.artifact_path(&TaskId::new()),
            Err(OrchestratorError::NotFound(_))
        ));

        let failed = manager.download(request()).await.unwrap();
        match manager.artifact_path(&failed.task_id) {
            Err(OrchestratorError::TaskFailed(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected: {other:?}"),
        }

        let pending = TaskId::new();
        manager.store().create(pending, request()).unwrap();
        assert!(matches!(
            manager.artifact_path(&pending),
            Err(OrchestratorError::NotReady(TaskStatus::Pending))
        ));
    }

    #[tokio::test]
    async fn test_artifact_missing_on_disk() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp, ScriptedExtractor::completing("a.mp3", b"x".to_vec()));

        let record = manager.download(request()).await.unwrap();
        std::fs::remove_file(record.file_path.unwrap()).unwrap();
        assert!(matches!(
            manager.artifact_path(&record.task_id),
            Err(OrchestratorError::ArtifactMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_task() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp, ScriptedExtractor::completing("a.mp3", b"x".to_vec()));

        let record = manager.download(request()).await.unwrap();
        let dir = manager.dirs().path(&record.task_id);
        assert!(dir.is_dir());

        assert!(manager.cleanup_task(&record.task_id).await.unwrap());
        assert!(!dir.exists());
        assert!(manager.get_progress(&record.task_id).is_none());
        assert!(!manager.cleanup_task(&record.task_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_schedule_cleanup_after_delay() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp, ScriptedExtractor::completing("a.mp3", b"x".to_vec()));

        let record = manager.download(request()).await.unwrap();
        manager.schedule_cleanup(record.task_id, Duration::from_millis(50));
        assert!(manager.get_progress(&record.task_id).is_some());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(manager.get_progress(&record.task_id).is_none());
        assert!(!manager.dirs().path(&record.task_id).exists());
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_tasks() {
        let tmp = TempDir::new().unwrap();
        let manager = manager(&tmp, ScriptedExtractor::completing("a.mp3", b"x".to_vec()));
        manager.shutdown();

        let record = manager.download(request()).await.unwrap();
        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(record.error.as_deref(), Some(SHUTDOWN_MESSAGE));
    }

    #[tokio::test]
    async fn test_provision_failure_leaves_no_record() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("file-not-dir");
        std::fs::write(&root, b"x").unwrap();

        let mut config = Config::default();
        config.downloads.root = root;
        let manager = DownloadManager::new(&config, Arc::new(ScriptedExtractor::new()));

        assert!(matches!(
            manager.start_download(request()).await,
            Err(OrchestratorError::Storage(_))
        ));
        assert!(manager.store().is_empty());
    }
}
