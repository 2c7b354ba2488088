//! SQLite-backed task store using sqlx.
//!
//! Timestamps are stored as epoch milliseconds; recipients as a JSON array.

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    sqlx::{
        Row, SqlitePool,
        sqlite::{SqlitePoolOptions, SqliteQueryResult, SqliteRow},
    },
};

use crate::{
    Error, Result,
    store::TaskStore,
    types::{RunCompletion, RunStatus, ScheduledTask, TaskCreate, TaskId},
};

const TASK_COLUMNS: &str = "id, name, cron_expression, agent_name, prompt, recipients, is_active, \
                            last_run_at, last_run_status, last_run_error, next_run_at, \
                            created_at, updated_at";

/// SQLite-backed persistence for scheduled tasks.
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Connect with a dedicated pool and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database on a single long-lived connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        crate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Use an existing pool. [`crate::run_migrations`] must already have run.
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn expect_row(id: TaskId, result: SqliteQueryResult) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(Error::task_not_found(id));
    }
    Ok(())
}

fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| Error::message(format!("timestamp out of range: {ms}")))
}

fn task_from_row(row: &SqliteRow) -> Result<ScheduledTask> {
    let recipients: String = row.get("recipients");
    let status: String = row.get("last_run_status");
    Ok(ScheduledTask {
        id: row.get("id"),
        name: row.get("name"),
        cron_expression: row.get("cron_expression"),
        agent_name: row.get("agent_name"),
        prompt: row.get("prompt"),
        recipients: serde_json::from_str(&recipients)?,
        is_active: row.get("is_active"),
        last_run_at: row
            .get::<Option<i64>, _>("last_run_at")
            .map(from_millis)
            .transpose()?,
        last_run_status: status.parse()?,
        last_run_error: row.get("last_run_error"),
        next_run_at: row
            .get::<Option<i64>, _>("next_run_at")
            .map(from_millis)
            .transpose()?,
        created_at: from_millis(row.get("created_at"))?,
        updated_at: from_millis(row.get("updated_at"))?,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn load_active_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE is_active = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(task_from_row).collect()
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<ScheduledTask>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn insert_task(&self, create: &TaskCreate, now: DateTime<Utc>) -> Result<ScheduledTask> {
        let recipients = serde_json::to_string(&create.recipients)?;
        let result = sqlx::query(
            "INSERT INTO scheduled_tasks
                (name, cron_expression, agent_name, prompt, recipients, is_active,
                 last_run_status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&create.name)
        .bind(&create.cron_expression)
        .bind(&create.agent_name)
        .bind(&create.prompt)
        .bind(&recipients)
        .bind(create.is_active)
        .bind(RunStatus::None.as_str())
        .bind(to_millis(now))
        .bind(to_millis(now))
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get_task(id)
            .await?
            .ok_or_else(|| Error::task_not_found(id))
    }

    async fn update_task(&self, task: &ScheduledTask) -> Result<()> {
        let recipients = serde_json::to_string(&task.recipients)?;
        let result = sqlx::query(
            "UPDATE scheduled_tasks
             SET name = ?, cron_expression = ?, agent_name = ?, prompt = ?,
                 recipients = ?, is_active = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&task.name)
        .bind(&task.cron_expression)
        .bind(&task.agent_name)
        .bind(&task.prompt)
        .bind(&recipients)
        .bind(task.is_active)
        .bind(to_millis(task.updated_at))
        .bind(task.id)
        .execute(&self.pool)
        .await?;
        expect_row(task.id, result)
    }

    async fn delete_task(&self, id: TaskId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_pending(&self, id: TaskId, started_at: DateTime<Utc>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE scheduled_tasks
             SET last_run_status = ?, last_run_at = ?, last_run_error = NULL
             WHERE id = ?",
        )
        .bind(RunStatus::Pending.as_str())
        .bind(to_millis(started_at))
        .bind(id)
        .execute(&self.pool)
        .await?;
        expect_row(id, result)
    }

    async fn record_completion(&self, id: TaskId, completion: &RunCompletion) -> Result<()> {
        let result = sqlx::query(
            "UPDATE scheduled_tasks
             SET last_run_status = ?, last_run_error = ?, next_run_at = ?
             WHERE id = ?",
        )
        .bind(completion.status.as_str())
        .bind(&completion.error)
        .bind(completion.next_run_at.map(to_millis))
        .bind(id)
        .execute(&self.pool)
        .await?;
        expect_row(id, result)
    }

    async fn set_next_run(&self, id: TaskId, next_run_at: Option<DateTime<Utc>>) -> Result<()> {
        let result = sqlx::query("UPDATE scheduled_tasks SET next_run_at = ? WHERE id = ?")
            .bind(next_run_at.map(to_millis))
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_row(id, result)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, chrono::TimeZone};

    async fn make_store() -> SqliteTaskStore {
        SqliteTaskStore::in_memory().await.unwrap()
    }

    fn create(name: &str, active: bool) -> TaskCreate {
        TaskCreate {
            name: name.into(),
            cron_expression: "0 9 * * 1#1".into(),
            agent_name: "finance".into(),
            prompt: "Monthly revenue summary".into(),
            recipients: vec!["cfo@example.com".into(), "ops@example.com".into()],
            is_active: active,
        }
    }

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn insert_and_get() {
        let store = make_store().await;
        let task = store.insert_task(&create("a", true), ts(8)).await.unwrap();
        assert_eq!(task.name, "a");
        assert_eq!(task.recipients.len(), 2);
        assert_eq!(task.last_run_status, RunStatus::None);
        assert_eq!(task.created_at, ts(8));
        assert_eq!(store.get_task(task.id).await.unwrap().unwrap(), task);
        assert!(store.get_task(task.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_active_filters_inactive() {
        let store = make_store().await;
        store.insert_task(&create("on", true), ts(8)).await.unwrap();
        store.insert_task(&create("off", false), ts(8)).await.unwrap();
        let active = store.load_active_tasks().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "on");
        assert_eq!(store.list_tasks().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_keeps_run_bookkeeping() {
        let store = make_store().await;
        let mut task = store.insert_task(&create("a", true), ts(8)).await.unwrap();
        store.mark_pending(task.id, ts(9)).await.unwrap();

        task.prompt = "Quarterly revenue summary".into();
        task.updated_at = ts(10);
        store.update_task(&task).await.unwrap();

        let row = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(row.prompt, "Quarterly revenue summary");
        assert_eq!(row.last_run_status, RunStatus::Pending);
        assert_eq!(row.last_run_at, Some(ts(9)));
        assert_eq!(row.updated_at, ts(10));
    }

    #[tokio::test]
    async fn completion_replaces_status_and_next_run() {
        let store = make_store().await;
        let task = store.insert_task(&create("a", true), ts(8)).await.unwrap();
        store.mark_pending(task.id, ts(9)).await.unwrap();
        store
            .record_completion(task.id, &RunCompletion {
                status: RunStatus::Success,
                error: None,
                finished_at: ts(10),
                next_run_at: Some(ts(20)),
            })
            .await
            .unwrap();
        let row = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(row.last_run_status, RunStatus::Success);
        assert_eq!(row.next_run_at, Some(ts(20)));
        assert!(row.last_run_error.is_none());

        store.set_next_run(task.id, None).await.unwrap();
        let row = store.get_task(task.id).await.unwrap().unwrap();
        assert!(row.next_run_at.is_none());
    }

    #[tokio::test]
    async fn mark_pending_clears_previous_error() {
        let store = make_store().await;
        let task = store.insert_task(&create("a", true), ts(8)).await.unwrap();
        store
            .record_completion(task.id, &RunCompletion {
                status: RunStatus::Failed,
                error: Some("smtp down".into()),
                finished_at: ts(9),
                next_run_at: None,
            })
            .await
            .unwrap();
        store.mark_pending(task.id, ts(10)).await.unwrap();
        let row = store.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(row.last_run_status, RunStatus::Pending);
        assert!(row.last_run_error.is_none());
    }

    #[tokio::test]
    async fn writes_to_missing_row_fail() {
        let store = make_store().await;
        assert!(matches!(
            store.mark_pending(42, ts(9)).await,
            Err(Error::TaskNotFound { task_id: 42 })
        ));
        assert!(store.set_next_run(42, None).await.is_err());
        assert!(!store.delete_task(42).await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = make_store().await;
        let task = store.insert_task(&create("a", true), ts(8)).await.unwrap();
        assert!(store.delete_task(task.id).await.unwrap());
        assert!(store.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_database_persists_across_pools() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("tasks.db").display());
        let id = {
            let store = SqliteTaskStore::new(&url).await.unwrap();
            store.insert_task(&create("a", true), ts(8)).await.unwrap().id
        };
        let store = SqliteTaskStore::new(&url).await.unwrap();
        assert_eq!(store.get_task(id).await.unwrap().unwrap().name, "a");
    }
}
