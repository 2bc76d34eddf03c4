//! Request and response bodies of the HTTP API
//!
//! - `POST /api/download` accepts a [`DownloadRequest`] and answers with a
//!   [`TaskResponse`]
//! - `GET /api/status/{task_id}` returns a [`StatusResponse`]
//! - errors always use [`ErrorResponse`]
//!
//! ```json
//! { "url": "https://youtu.be/dQw4w9WgXcQ", "format_type": "audio", "quality": "best" }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::observability::MetricsSnapshot;
use crate::tasks::{ProgressRecord, TaskStatus};

fn default_format_type() -> String {
    "video".to_string()
}

fn default_quality() -> String {
    "best".to_string()
}

/// Accepts `"720"` as well as `720`
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadRequest {
    pub url: String,
    #[serde(default = "default_format_type")]
    pub format_type: String,
    #[serde(default = "default_quality", deserialize_with = "string_or_number")]
    pub quality: String,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct DownloadQuery {
    /// Hold the response until the task is terminal
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub error: Option<String>,
    pub file_path: Option<String>,
}

impl From<ProgressRecord> for TaskResponse {
    fn from(record: ProgressRecord) -> Self {
        Self {
            task_id: record.task_id.to_string(),
            status: record.status,
            progress: record.progress,
            error: record.error,
            file_path: record.file_path.map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusResponse {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: f64,
    pub percent: f64,
    pub filename: String,
    pub error: Option<String>,
    pub file_path: Option<String>,
    pub speed: f64,
    pub eta: f64,
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProgressRecord> for StatusResponse {
    fn from(record: ProgressRecord) -> Self {
        Self {
            task_id: record.task_id.to_string(),
            status: record.status,
            progress: record.progress,
            percent: record.percent,
            filename: record.filename,
            error: record.error,
            file_path: record.file_path.map(|p| p.to_string_lossy().into_owned()),
            speed: record.speed,
            eta: record.eta,
            downloaded_bytes: record.downloaded_bytes,
            total_bytes: record.total_bytes,
            title: record.title,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeleteResponse {
    pub message: String,
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CleanupResponse {
    pub message: String,
    pub cleaned_items: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
    pub active_downloads: usize,
    pub tasks: usize,
    pub metrics: MetricsSnapshot,
}
