//! Scheduling coordinator: timer loop, job execution, task CRUD.
//!
//! The coordinator owns the live registry and is the only writer of run
//! bookkeeping. Each execution writes `pending` before the callback starts
//! and exactly one completion record after it ends, and at most one
//! execution per task is in flight at any time.

use std::{
    any::Any,
    collections::HashSet,
    panic::AssertUnwindSafe,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    agentdesk_common::text::clip_chars,
    agentdesk_config::SchedulerConfig,
    chrono::{DateTime, Utc},
    chrono_tz::Tz,
    futures::FutureExt,
    tokio::{
        sync::{Mutex as AsyncMutex, Notify},
        task::JoinHandle,
    },
    tokio_util::task::TaskTracker,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use {
    crate::metrics as names,
    ::metrics::{counter, gauge, histogram},
};

use crate::{
    Error, Result,
    callback::{ExecutionError, RunReport, TaskCallback},
    error::ScheduleFormatError,
    expr::{ScheduleDescriptor, parse_schedule, parse_timezone},
    registry::{JobRegistry, JobSnapshot},
    store::TaskStore,
    trigger::next_fire_after,
    types::{
        RunCompletion, RunOutcome, RunStatus, ScheduledTask, SchedulerStatus, TaskCreate, TaskId,
        TaskPatch, TriggerKind,
    },
};

/// Stored error text is cut to this many characters.
pub const MAX_ERROR_CHARS: usize = 1000;

/// Error recorded for a run that was still `pending` when the process restarted.
pub const INTERRUPTED_ERROR: &str = "interrupted: scheduler stopped before the run finished";

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub timezone: Tz,
    /// Upper bound on how long the loop sleeps between due-job checks.
    pub tick_interval: Duration,
    pub misfire_grace: Duration,
    pub execution_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Europe::Rome,
            tick_interval: Duration::from_secs(1),
            misfire_grace: Duration::from_secs(3600),
            execution_timeout: Duration::from_secs(2 * 60 * 60),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &SchedulerConfig) -> Result<Self> {
        Ok(Self {
            timezone: parse_timezone(&config.timezone)?,
            tick_interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            misfire_grace: Duration::from_secs(config.misfire_grace_secs),
            execution_timeout: Duration::from_secs(config.execution_timeout_secs.max(1)),
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        })
    }
}

type InFlight = Arc<Mutex<HashSet<TaskId>>>;

/// Claim on a task's single execution slot. Released on drop.
struct RunSlot {
    task_id: TaskId,
    in_flight: InFlight,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.task_id);
    }
}

/// The scheduler service.
pub struct Scheduler {
    store: Arc<dyn TaskStore>,
    callback: Arc<dyn TaskCallback>,
    options: SchedulerOptions,
    registry: JobRegistry,
    in_flight: InFlight,
    tracker: TaskTracker,
    wake_notify: Notify,
    running: AtomicBool,
    timer_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        callback: Arc<dyn TaskCallback>,
        options: SchedulerOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            callback,
            options,
            registry: JobRegistry::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tracker: TaskTracker::new(),
            wake_notify: Notify::new(),
            running: AtomicBool::new(false),
            timer_handle: AsyncMutex::new(None),
        })
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Register every active task and start the timer loop.
    ///
    /// Rows left `pending` by a previous process are recorded as failed.
    /// Returns how many jobs were registered.
    pub async fn start(self: &Arc<Self>) -> Result<usize> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("scheduler already running");
            return Ok(self.registry.len());
        }
        let registered = match self.load_tasks(Utc::now()).await {
            Ok(n) => n,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            },
        };

        self.tracker.reopen();
        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move {
            svc.timer_loop().await;
        });
        *self.timer_handle.lock().await = Some(handle);

        info!(
            registered,
            timezone = self.options.timezone.name(),
            "scheduler started"
        );
        Ok(registered)
    }

    /// Stop the timer loop and wait up to the shutdown grace for in-flight
    /// executions. Executions still running after that are abandoned: they
    /// keep their `pending` status and are reconciled on the next start.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.wake_notify.notify_one();
        if let Some(handle) = self.timer_handle.lock().await.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "timer loop ended abnormally");
        }

        self.tracker.close();
        let in_flight = self.in_flight_count();
        if in_flight > 0 {
            info!(in_flight, "waiting for in-flight executions");
        }
        if tokio::time::timeout(self.options.shutdown_grace, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                abandoned = self.in_flight_count(),
                "shutdown grace elapsed, abandoning in-flight executions"
            );
        }
        info!("scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Parse an expression in the scheduler's timezone.
    pub fn parse(
        &self,
        expression: &str,
    ) -> std::result::Result<ScheduleDescriptor, ScheduleFormatError> {
        parse_schedule(expression, self.options.timezone)
    }

    /// Bring the registry in line with one task definition: inactive tasks
    /// are unscheduled, active ones (re)registered with a fresh trigger.
    /// The resulting next run time is persisted and returned.
    pub async fn sync_task(&self, task: &ScheduledTask) -> Result<Option<DateTime<Utc>>> {
        if !task.is_active {
            if self.registry.contains(task.id) {
                self.registry.remove(task.id);
                info!(task_id = task.id, "task deactivated, unscheduled");
            }
            self.store.set_next_run(task.id, None).await?;
            self.record_job_count();
            return Ok(None);
        }

        let descriptor = self.parse(&task.cron_expression)?;
        let next = self.registry.add(
            task.id,
            &task.name,
            descriptor,
            Arc::clone(&self.callback),
            Utc::now(),
        );
        self.store.set_next_run(task.id, next).await?;
        self.wake_notify.notify_one();
        self.record_job_count();
        info!(task_id = task.id, name = %task.name, next_run_at = ?next, "task scheduled");
        Ok(next)
    }

    /// Drop a task's job without touching the store.
    pub fn unschedule(&self, task_id: TaskId) -> bool {
        let removed = self.registry.remove(task_id);
        self.record_job_count();
        removed
    }

    pub fn next_fire_time(&self, task_id: TaskId) -> Option<DateTime<Utc>> {
        self.registry.next_fire_time(task_id)
    }

    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.registry.list()
    }

    pub fn is_executing(&self, task_id: TaskId) -> bool {
        self.lock_in_flight().contains(&task_id)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            timezone: self.options.timezone.name().to_string(),
            job_count: self.registry.len(),
            in_flight: self.in_flight_count(),
            next_fire_at: self.registry.earliest_fire(),
        }
    }

    // ── Task CRUD ───────────────────────────────────────────────────────

    pub async fn list_tasks(&self) -> Result<Vec<ScheduledTask>> {
        self.store.list_tasks().await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<ScheduledTask> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| Error::task_not_found(id))
    }

    /// Validate, persist and schedule a new task. An invalid expression is
    /// rejected before anything is written.
    pub async fn create_task(&self, create: TaskCreate) -> Result<ScheduledTask> {
        validate_fields(&create.name, &create.agent_name, &create.prompt)?;
        self.parse(&create.cron_expression)?;

        let mut task = self.store.insert_task(&create, Utc::now()).await?;
        task.next_run_at = self.sync_task(&task).await?;
        info!(task_id = task.id, name = %task.name, "scheduled task created");
        Ok(task)
    }

    /// Apply a patch. Changes to the expression or active flag replace the
    /// live job; content-only edits take effect on the next run since the
    /// callback loads the task by id.
    pub async fn update_task(&self, id: TaskId, patch: TaskPatch) -> Result<ScheduledTask> {
        let mut task = self.get_task(id).await?;
        let reschedule = patch.touches_schedule();
        let expression_changed = patch.cron_expression.is_some();
        patch.apply(&mut task);
        validate_fields(&task.name, &task.agent_name, &task.prompt)?;
        if task.is_active || expression_changed {
            self.parse(&task.cron_expression)?;
        }

        task.updated_at = Utc::now();
        self.store.update_task(&task).await?;
        if reschedule {
            task.next_run_at = self.sync_task(&task).await?;
        }
        info!(task_id = id, reschedule, "scheduled task updated");
        Ok(task)
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<()> {
        if self.registry.contains(id) {
            self.unschedule(id);
        }
        if !self.store.delete_task(id).await? {
            return Err(Error::task_not_found(id));
        }
        info!(task_id = id, "scheduled task deleted");
        Ok(())
    }

    /// Execute a task immediately, outside its schedule, and wait for the
    /// outcome. Fails with [`Error::AlreadyRunning`] if a run is in flight.
    pub async fn run_now(&self, id: TaskId) -> Result<RunOutcome> {
        self.get_task(id).await?;
        let slot = self
            .try_claim(id)
            .ok_or(Error::AlreadyRunning { task_id: id })?;
        let callback = self
            .registry
            .callback(id)
            .unwrap_or_else(|| Arc::clone(&self.callback));
        Ok(self.execute(slot, TriggerKind::Manual, callback).await)
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn load_tasks(&self, now: DateTime<Utc>) -> Result<usize> {
        let tasks = self.store.load_active_tasks().await?;
        info!(count = tasks.len(), "loaded active scheduled tasks");

        let mut registered = 0;
        for task in tasks {
            if task.last_run_status == RunStatus::Pending {
                warn!(task_id = task.id, "previous run was interrupted, marking failed");
                let completion = RunCompletion {
                    status: RunStatus::Failed,
                    error: Some(INTERRUPTED_ERROR.to_string()),
                    finished_at: now,
                    next_run_at: task.next_run_at,
                };
                self.store.record_completion(task.id, &completion).await?;
            }

            let descriptor = match self.parse(&task.cron_expression) {
                Ok(d) => d,
                Err(e) => {
                    error!(task_id = task.id, error = %e, "skipping task with invalid cron expression");
                    self.store.set_next_run(task.id, None).await?;
                    continue;
                },
            };

            let missed = task.next_run_at.filter(|t| *t <= now);
            let next = self.registry.add_with_missed(
                task.id,
                &task.name,
                descriptor,
                Arc::clone(&self.callback),
                now,
                missed,
            );
            if missed.is_none() {
                self.store.set_next_run(task.id, next).await?;
            }
            registered += 1;
        }
        self.record_job_count();
        Ok(registered)
    }

    async fn timer_loop(self: Arc<Self>) {
        loop {
            let sleep = self.sleep_duration(Utc::now());
            tokio::select! {
                () = tokio::time::sleep(sleep) => {},
                () = self.wake_notify.notified() => {
                    debug!("timer loop woken by notify");
                },
            }
            if !self.is_running() {
                break;
            }
            self.tick(Utc::now());
        }
        debug!("timer loop exited");
    }

    fn sleep_duration(&self, now: DateTime<Utc>) -> Duration {
        self.registry
            .earliest_fire()
            .map(|t| (t - now).to_std().unwrap_or_default())
            .map_or(self.options.tick_interval, |d| {
                d.min(self.options.tick_interval)
            })
    }

    /// Fire everything due at `now`. Never blocks on execution.
    fn tick(self: &Arc<Self>, now: DateTime<Utc>) {
        let due = self.registry.take_due(now, self.options.misfire_grace);

        for missed in due.dropped {
            warn!(
                task_id = missed.task_id,
                name = %missed.name,
                scheduled_for = %missed.scheduled_for,
                late_by_secs = missed.late_by.as_secs(),
                "missed fire outside grace window, dropping"
            );
            #[cfg(feature = "metrics")]
            counter!(names::MISFIRES_DROPPED_TOTAL).increment(1);

            let store = Arc::clone(&self.store);
            let next = self.registry.next_fire_time(missed.task_id);
            self.tracker.spawn(async move {
                if let Err(e) = store.set_next_run(missed.task_id, next).await {
                    warn!(task_id = missed.task_id, error = %e, "failed to persist next run time");
                }
            });
        }

        for firing in due.firings {
            let Some(slot) = self.try_claim(firing.task_id) else {
                warn!(
                    task_id = firing.task_id,
                    name = %firing.name,
                    "previous run still in progress, skipping fire"
                );
                #[cfg(feature = "metrics")]
                counter!(names::OVERLAPS_SKIPPED_TOTAL).increment(1);
                continue;
            };
            #[cfg(feature = "metrics")]
            histogram!(names::FIRE_LATENCY_SECONDS)
                .record((now - firing.scheduled_for).num_milliseconds() as f64 / 1000.0);

            let svc = Arc::clone(self);
            self.tracker.spawn(async move {
                svc.execute(slot, firing.kind, firing.callback).await;
            });
        }
    }

    async fn execute(
        &self,
        slot: RunSlot,
        trigger: TriggerKind,
        callback: Arc<dyn TaskCallback>,
    ) -> RunOutcome {
        let task_id = slot.task_id;
        let started_at = Utc::now();
        info!(task_id, trigger = ?trigger, "executing scheduled task");
        #[cfg(feature = "metrics")]
        {
            counter!(names::EXECUTIONS_TOTAL, names::TRIGGER => trigger_label(trigger))
                .increment(1);
            gauge!(names::EXECUTIONS_IN_FLIGHT).set(self.in_flight_count() as f64);
        }

        let result = match self.store.mark_pending(task_id, started_at).await {
            Ok(()) => self.invoke(task_id, callback).await,
            Err(e) => {
                error!(task_id, error = %e, "could not record pending status, skipping execution");
                Err(ExecutionError::Store(e.to_string()))
            },
        };

        let finished_at = Utc::now();
        let (status, error) = match &result {
            Ok(report) => {
                info!(task_id, summary = %report.summary, "scheduled task succeeded");
                (RunStatus::Success, None)
            },
            Err(e) => {
                error!(task_id, kind = e.kind(), error = %e, "scheduled task failed");
                #[cfg(feature = "metrics")]
                counter!(names::ERRORS_TOTAL, names::ERROR => e.kind()).increment(1);
                (
                    RunStatus::Failed,
                    Some(clip_chars(&e.to_string(), MAX_ERROR_CHARS)),
                )
            },
        };

        let next_run_at = self
            .registry
            .descriptor(task_id)
            .and_then(|d| next_fire_after(&d, finished_at));
        let completion = RunCompletion {
            status,
            error: error.clone(),
            finished_at,
            next_run_at,
        };
        match self.store.record_completion(task_id, &completion).await {
            Ok(()) => {
                // Deactivated between the descriptor lookup and the write.
                if next_run_at.is_some()
                    && !self.registry.contains(task_id)
                    && let Err(e) = self.store.set_next_run(task_id, None).await
                {
                    warn!(task_id, error = %e, "failed to clear next run time");
                }
            },
            Err(e) => error!(task_id, error = %e, "failed to record run completion"),
        }
        drop(slot);

        let outcome = RunOutcome {
            task_id,
            trigger,
            started_at,
            finished_at,
            status,
            error,
            next_run_at,
        };
        #[cfg(feature = "metrics")]
        histogram!(names::EXECUTION_DURATION_SECONDS)
            .record(outcome.duration_ms() as f64 / 1000.0);
        info!(
            task_id,
            status = %outcome.status,
            duration_ms = outcome.duration_ms(),
            next_run_at = ?outcome.next_run_at,
            "scheduled task finished"
        );
        outcome
    }

    async fn invoke(
        &self,
        task_id: TaskId,
        callback: Arc<dyn TaskCallback>,
    ) -> std::result::Result<RunReport, ExecutionError> {
        let run = AssertUnwindSafe(callback.run(task_id)).catch_unwind();
        match tokio::time::timeout(self.options.execution_timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(ExecutionError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(ExecutionError::Timeout {
                after: self.options.execution_timeout,
            }),
        }
    }

    fn try_claim(&self, task_id: TaskId) -> Option<RunSlot> {
        self.lock_in_flight().insert(task_id).then(|| RunSlot {
            task_id,
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<TaskId>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn in_flight_count(&self) -> usize {
        self.lock_in_flight().len()
    }

    fn record_job_count(&self) {
        #[cfg(feature = "metrics")]
        gauge!(names::JOBS_SCHEDULED).set(self.registry.len() as f64);
    }
}

#[cfg(feature = "metrics")]
fn trigger_label(trigger: TriggerKind) -> &'static str {
    match trigger {
        TriggerKind::Scheduled => "scheduled",
        TriggerKind::CatchUp => "catch_up",
        TriggerKind::Manual => "manual",
    }
}

fn validate_fields(name: &str, agent_name: &str, prompt: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::invalid_task("name must not be empty"));
    }
    if agent_name.trim().is_empty() {
        return Err(Error::invalid_task("agent_name must not be empty"));
    }
    if prompt.trim().is_empty() {
        return Err(Error::invalid_task("prompt must not be empty"));
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
