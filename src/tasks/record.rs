//! Per-task progress record and its status state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use super::error::{Result, TaskError};
use crate::backend::{EventStatus, MediaFormat, ProgressEvent, Quality};

/// Random task identifier; also the name of the task's output directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(TaskId)
            .map_err(|_| TaskError::InvalidId(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Starting,
    Downloading,
    Processing,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    /// Allowed edges of the task lifecycle. `Downloading -> Downloading` is the
    /// in-place progress update.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        match (self, next) {
            (Completed | Error, _) => false,
            (_, Error) => true,
            (Pending, Starting) => true,
            (Starting, Downloading | Processing) => true,
            (Downloading, Downloading | Processing) => true,
            (Processing, Completed) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Starting => "starting",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the caller asked for when the task was created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub url: String,
    pub format: MediaFormat,
    pub quality: Quality,
}

/// Mutable state of one download task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress: f64,
    pub percent: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub speed: f64,
    pub eta: f64,
    pub filename: String,
    pub file_path: Option<PathBuf>,
    pub error: Option<String>,
    pub title: Option<String>,
    pub request: TaskRequest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressRecord {
    pub fn new(task_id: TaskId, request: TaskRequest) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            status: TaskStatus::Pending,
            progress: 0.0,
            percent: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            speed: 0.0,
            eta: 0.0,
            filename: String::new(),
            file_path: None,
            error: None,
            title: None,
            request,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves to `next` if the edge is allowed; the record is untouched otherwise.
    pub fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn set_percent(&mut self, percent: f64) {
        self.percent = percent;
        self.progress = percent;
    }

    /// Folds one backend progress event into the record.
    ///
    /// Returns `false` when the event was ignored because the current status does
    /// not accept it (terminal task, or a late `downloading` event for the second
    /// stream of a merged download while already `processing`).
    pub fn apply_event(&mut self, event: &ProgressEvent) -> bool {
        match event.status {
            EventStatus::Downloading => {
                if self.transition(TaskStatus::Downloading).is_err() {
                    debug!(task_id = %self.task_id, status = %self.status, "Ignoring downloading event");
                    return false;
                }

                let downloaded = event.downloaded_bytes.unwrap_or(0);
                let total = event.total_bytes.unwrap_or(0);

                self.downloaded_bytes = downloaded;
                self.total_bytes = total;
                self.speed = event.speed.unwrap_or(0.0);
                self.eta = event.eta.unwrap_or(0.0);

                // Exact byte totals, then fragment counts, then the size estimate.
                let percent = if total > 0 {
                    (downloaded as f64 / total as f64) * 100.0
                } else if let Some((index, count)) = event.fragments() {
                    (index as f64 / count as f64) * 100.0
                } else if let Some(estimate) = event.estimated_total() {
                    ((downloaded as f64 / estimate as f64) * 100.0).min(100.0)
                } else {
                    0.0
                };
                self.set_percent(percent);
                true
            }
            EventStatus::Finished => {
                if self.status != TaskStatus::Processing
                    && self.transition(TaskStatus::Processing).is_err()
                {
                    debug!(task_id = %self.task_id, status = %self.status, "Ignoring finished event");
                    return false;
                }

                self.set_percent(100.0);
                self.filename = event.filename.clone().unwrap_or_default();
                self.updated_at = Utc::now();
                true
            }
            EventStatus::Error => {
                let message = event
                    .error
                    .clone()
                    .unwrap_or_else(|| "Download failed".to_string());
                self.fail(message).is_ok()
            }
        }
    }

    /// Records the produced artifact and moves to `completed`.
    ///
    /// A task whose backend returned without a `finished` event is first moved
    /// through `processing`.
    pub fn complete(&mut self, file_path: PathBuf) -> Result<()> {
        if matches!(self.status, TaskStatus::Starting | TaskStatus::Downloading) {
            self.transition(TaskStatus::Processing)?;
        }
        self.transition(TaskStatus::Completed)?;

        if let Some(name) = file_path.file_name() {
            self.filename = name.to_string_lossy().into_owned();
        }
        self.file_path = Some(file_path);
        self.set_percent(100.0);
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Error)?;
        self.error = Some(message.into());
        Ok(())
    }
}
