use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::error::{Result, TaskError};
use super::record::{ProgressRecord, TaskId, TaskRequest};

/// In-memory map of live tasks, shared by pollers and worker callbacks
///
/// Every mutation runs as a single closure under the write lock, so readers
/// only ever see whole-event updates. Reads hand out snapshots.
#[derive(Debug, Default)]
pub struct TaskStore {
    records: RwLock<HashMap<TaskId, ProgressRecord>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning is ignored; record methods validate before they mutate.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<TaskId, ProgressRecord>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TaskId, ProgressRecord>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new task in `pending` state
    pub fn create(&self, task_id: TaskId, request: TaskRequest) -> Result<ProgressRecord> {
        let mut records = self.write();
        if records.contains_key(&task_id) {
            return Err(TaskError::DuplicateTask(task_id));
        }

        let record = ProgressRecord::new(task_id, request);
        records.insert(task_id, record.clone());
        debug!(%task_id, "Created task record");
        Ok(record)
    }

    /// Snapshot of a task, `None` if unknown
    pub fn get(&self, task_id: &TaskId) -> Option<ProgressRecord> {
        self.read().get(task_id).cloned()
    }

    /// Apply `f` to the record atomically; `None` if the task no longer exists
    pub fn update<R>(&self, task_id: &TaskId, f: impl FnOnce(&mut ProgressRecord) -> R) -> Option<R> {
        self.write().get_mut(task_id).map(f)
    }

    pub fn delete(&self, task_id: &TaskId) -> bool {
        let removed = self.write().remove(task_id).is_some();
        if removed {
            debug!(%task_id, "Deleted task record");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EventStatus, MediaFormat, ProgressEvent, Quality};
    use crate::tasks::TaskStatus;
    use std::sync::Arc;

    fn request() -> TaskRequest {
        TaskRequest {
            url: "https://www.youtube.com/watch?v=abc".to_string(),
            format: MediaFormat::Audio,
            quality: Quality::Best,
        }
    }

    #[test]
    fn test_get_unknown_returns_none() {
        let store = TaskStore::new();
        for _ in 0..16 {
            assert!(store.get(&TaskId::new()).is_none());
        }
        assert!(!store.delete(&TaskId::new()));
        assert!(store.update(&TaskId::new(), |r| r.status).is_none());
    }

    #[test]
    fn test_create_get_delete() {
        let store = TaskStore::new();
        let id = TaskId::new();

        let created = store.create(id, request()).unwrap();
        assert_eq!(created.status, TaskStatus::Pending);
        assert_eq!(store.get(&id).unwrap().task_id, id);
        assert_eq!(store.len(), 1);

        assert!(matches!(
            store.create(id, request()),
            Err(TaskError::DuplicateTask(_))
        ));

        assert!(store.delete(&id));
        assert!(store.get(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_updates_are_whole() {
        let store = Arc::new(TaskStore::new());
        let id = TaskId::new();
        store.create(id, request()).unwrap();
        store
            .update(&id, |r| r.transition(TaskStatus::Starting))
            .unwrap()
            .unwrap();

        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for downloaded in 0..=1000u64 {
                    let event = ProgressEvent {
                        status: EventStatus::Downloading,
                        downloaded_bytes: Some(downloaded),
                        total_bytes: Some(1000),
                        ..Default::default()
                    };
                    store.update(&id, |r| r.apply_event(&event));
                }
            })
        };

        for _ in 0..1000 {
            let snapshot = store.get(&id).unwrap();
            let expected = if snapshot.total_bytes > 0 {
                (snapshot.downloaded_bytes as f64 / snapshot.total_bytes as f64) * 100.0
            } else {
                0.0
            };
            assert_eq!(snapshot.percent, expected);
        }

        writer.join().unwrap();
        assert_eq!(store.get(&id).unwrap().percent, 100.0);
    }
}
