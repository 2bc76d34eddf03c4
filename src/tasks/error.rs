use thiserror::Error;

use super::record::{TaskId, TaskStatus};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task already exists: {0}")]
    DuplicateTask(TaskId),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("Invalid task id: {0}")]
    InvalidId(String),
}

pub type Result<T> = std::result::Result<T, TaskError>;
