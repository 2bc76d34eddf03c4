//! Task directory layout under the downloads root
//!
//! One directory per task, named by the task id. Nothing else is persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::humanize::ByteSize;
use crate::tasks::TaskId;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not found: {0}")]
    NotFound(PathBuf),
}

impl StorageError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == ErrorKind::NotFound {
            StorageError::NotFound(path.to_path_buf())
        } else {
            StorageError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Descriptive metadata of a produced file
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub size: u64,
    pub human_size: String,
    pub extension: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

impl ArtifactInfo {
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| StorageError::io(path, e))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(path.to_path_buf()));
        }

        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            size: metadata.len(),
            human_size: ByteSize(metadata.len()).to_human_readable(),
            extension: path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase()),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TaskDirs {
    root: PathBuf,
}

impl TaskDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))
    }

    pub fn path(&self, task_id: &TaskId) -> PathBuf {
        self.root.join(task_id.to_string())
    }

    /// Create the task's output directory
    pub async fn provision(&self, task_id: &TaskId) -> Result<PathBuf> {
        let dir = self.path(task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;
        tracing::debug!(%task_id, dir = %dir.display(), "Provisioned task directory");
        Ok(dir)
    }

    /// Delete the task directory and everything in it; `false` if it was absent
    pub async fn remove(&self, task_id: &TaskId) -> Result<bool> {
        let dir = self.path(task_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(%task_id, dir = %dir.display(), "Removed task directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(&dir, e)),
        }
    }

    /// Top-level directories under the root, whatever their names
    pub fn list_dirs(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.root, e)),
        };

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.root, e))?;
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => dirs.push(entry.path()),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %entry.path().display(), error = %e, "Skipping unreadable entry");
                }
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

/// First non-hidden regular file in `dir`, by file name
pub fn find_artifact(dir: &Path) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let name = entry.file_name();
        if name.to_string_lossy().starts_with('.') {
            continue;
        }
        if entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            candidates.push(entry.path());
        }
    }

    candidates.sort();
    Ok(candidates.into_iter().next())
}
