//! Process-wide counters, surfaced by the health endpoint

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    tasks_accepted: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    directories_swept: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_accepted(&self) {
        self.tasks_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_accepted", "Metric incremented");
    }

    pub fn task_completed(&self) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_completed", "Metric incremented");
    }

    pub fn task_failed(&self) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "tasks_failed", "Metric incremented");
    }

    pub fn directories_swept(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.directories_swept.fetch_add(count, Ordering::Relaxed);
        tracing::debug!(counter = "directories_swept", count, "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_accepted: self.tasks_accepted.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            directories_swept: self.directories_swept.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_accepted: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub directories_swept: u64,
}
