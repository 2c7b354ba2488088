//! Persistence trait for scheduled tasks.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    Result,
    types::{RunCompletion, ScheduledTask, TaskCreate, TaskId},
};

/// Durable store of task definitions and their last-run bookkeeping.
///
/// Run-status writes are single-row updates so they never clobber an admin
/// edit of the task definition, and vice versa.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn load_active_tasks(&self) -> Result<Vec<ScheduledTask>>;
    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>>;
    async fn get_task(&self, id: TaskId) -> Result<Option<ScheduledTask>>;
    async fn insert_task(&self, create: &TaskCreate, now: DateTime<Utc>) -> Result<ScheduledTask>;
    /// Persist the editable fields of `task`. Run bookkeeping is untouched.
    async fn update_task(&self, task: &ScheduledTask) -> Result<()>;
    /// Returns `false` if no such task existed.
    async fn delete_task(&self, id: TaskId) -> Result<bool>;
    /// Record that an execution started: status `pending`, `last_run_at`
    /// set, previous error cleared.
    async fn mark_pending(&self, id: TaskId, started_at: DateTime<Utc>) -> Result<()>;
    async fn record_completion(&self, id: TaskId, completion: &RunCompletion) -> Result<()>;
    async fn set_next_run(&self, id: TaskId, next_run_at: Option<DateTime<Utc>>) -> Result<()>;
}
