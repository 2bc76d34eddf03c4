//! Task bookkeeping: identifiers, progress records and the in-memory store
//!
//! Records are ephemeral. Nothing here survives a restart; a task directory left
//! behind by a previous process is only ever touched again by the cleanup sweep.

pub mod error;
pub mod record;
pub mod store;

pub use error::{Result, TaskError};
pub use record::{ProgressRecord, TaskId, TaskRequest, TaskStatus};
pub use store::TaskStore;
