//! In-memory store for testing.

use std::{
    collections::BTreeMap,
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
};

use crate::{
    Error, Result,
    store::TaskStore,
    types::{RunCompletion, RunStatus, ScheduledTask, TaskCreate, TaskId},
};

#[derive(Default)]
struct Inner {
    tasks: BTreeMap<TaskId, ScheduledTask>,
    last_id: TaskId,
}

/// In-memory store backed by a `BTreeMap`. No persistence, for tests only.
#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    fail_mark_pending: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `mark_pending` fail, to exercise the
    /// skipped-execution path.
    pub fn fail_mark_pending(&self, fail: bool) {
        self.fail_mark_pending.store(fail, Ordering::SeqCst);
    }

    /// Insert a fully-formed row, keeping its id and run bookkeeping.
    pub fn seed(&self, task: ScheduledTask) {
        let mut inner = self.lock();
        inner.last_id = inner.last_id.max(task.id);
        inner.tasks.insert(task.id, task);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_task<T>(&self, id: TaskId, f: impl FnOnce(&mut ScheduledTask) -> T) -> Result<T> {
        let mut inner = self.lock();
        let task = inner
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::task_not_found(id))?;
        Ok(f(task))
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn load_active_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let inner = self.lock();
        Ok(inner.tasks.values().filter(|t| t.is_active).cloned().collect())
    }

    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        Ok(self.lock().tasks.values().cloned().collect())
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<ScheduledTask>> {
        Ok(self.lock().tasks.get(&id).cloned())
    }

    async fn insert_task(&self, create: &TaskCreate, now: DateTime<Utc>) -> Result<ScheduledTask> {
        let mut inner = self.lock();
        inner.last_id += 1;
        let task = ScheduledTask {
            id: inner.last_id,
            name: create.name.clone(),
            cron_expression: create.cron_expression.clone(),
            agent_name: create.agent_name.clone(),
            prompt: create.prompt.clone(),
            recipients: create.recipients.clone(),
            is_active: create.is_active,
            last_run_at: None,
            last_run_status: RunStatus::None,
            last_run_error: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        };
        inner.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn update_task(&self, task: &ScheduledTask) -> Result<()> {
        self.with_task(task.id, |row| {
            row.name = task.name.clone();
            row.cron_expression = task.cron_expression.clone();
            row.agent_name = task.agent_name.clone();
            row.prompt = task.prompt.clone();
            row.recipients = task.recipients.clone();
            row.is_active = task.is_active;
            row.updated_at = task.updated_at;
        })
    }

    async fn delete_task(&self, id: TaskId) -> Result<bool> {
        Ok(self.lock().tasks.remove(&id).is_some())
    }

    async fn mark_pending(&self, id: TaskId, started_at: DateTime<Utc>) -> Result<()> {
        if self.fail_mark_pending.load(Ordering::SeqCst) {
            return Err(Error::message("store unavailable"));
        }
        self.with_task(id, |row| {
            row.last_run_status = RunStatus::Pending;
            row.last_run_at = Some(started_at);
            row.last_run_error = None;
        })
    }

    async fn record_completion(&self, id: TaskId, completion: &RunCompletion) -> Result<()> {
        self.with_task(id, |row| {
            row.last_run_status = completion.status;
            row.last_run_error = completion.error.clone();
            row.next_run_at = completion.next_run_at;
        })
    }

    async fn set_next_run(&self, id: TaskId, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        self.with_task(id, |row| row.next_run_at = next_run_at)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn create(name: &str) -> TaskCreate {
        TaskCreate {
            name: name.into(),
            cron_expression: "0 9 * * *".into(),
            agent_name: "sales".into(),
            prompt: "p".into(),
            recipients: vec!["a@example.com".into()],
            is_active: true,
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let store = InMemoryStore::new();
        let a = store.insert_task(&create("a"), Utc::now()).await.unwrap();
        let b = store.insert_task(&create("b"), Utc::now()).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(store.list_tasks().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn run_bookkeeping_lifecycle() {
        let store = InMemoryStore::new();
        let task = store.insert_task(&create("a"), Utc::now()).await.unwrap();
        let started = Utc::now();
        store.mark_pending(task.id, started).await.unwrap();
        let row = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(row.last_run_status, RunStatus::Pending);
        assert_eq!(row.last_run_at, Some(started));

        store
            .record_completion(task.id, &RunCompletion {
                status: RunStatus::Failed,
                error: Some("boom".into()),
                finished_at: Utc::now(),
                next_run_at: None,
            })
            .await
            .unwrap();
        let row = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(row.last_run_status, RunStatus::Failed);
        assert_eq!(row.last_run_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn writes_to_missing_task_fail() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.mark_pending(9, Utc::now()).await,
            Err(Error::TaskNotFound { task_id: 9 })
        ));
        assert!(!store.delete_task(9).await.unwrap());
    }

    #[tokio::test]
    async fn inactive_tasks_are_not_loaded() {
        let store = InMemoryStore::new();
        let mut c = create("off");
        c.is_active = false;
        store.insert_task(&c, Utc::now()).await.unwrap();
        store.insert_task(&create("on"), Utc::now()).await.unwrap();
        let active = store.load_active_tasks().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "on");
    }
}
