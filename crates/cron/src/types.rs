//! Core data types for scheduled tasks and their runs.

use std::{fmt, str::FromStr};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::Error;

/// Durable identifier of a scheduled task (database row id).
pub type TaskId = i64;

/// Outcome of the most recent run, as persisted on the task row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Never ran.
    #[default]
    None,
    /// Written before the callback starts; an execution is in flight.
    Pending,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            other => Err(Error::message(format!("unknown run status: {other}"))),
        }
    }
}

/// Why an execution started.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// The trigger came due while the firing loop was watching.
    Scheduled,
    /// One collapsed run for fires missed within the grace window.
    CatchUp,
    /// Admin "test" request.
    Manual,
}

/// A scheduled task as stored durably.
///
/// `next_run_at` is a cache of the live trigger: it is recomputed after
/// every status change and cleared while the task is inactive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub name: String,
    pub cron_expression: String,
    pub agent_name: String,
    pub prompt: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_status: RunStatus,
    pub last_run_error: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreate {
    pub name: String,
    pub cron_expression: String,
    pub agent_name: String,
    pub prompt: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Patch for updating an existing task. Absent fields are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron_expression: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

impl TaskPatch {
    /// Whether the patch changes anything that affects the live trigger.
    pub fn touches_schedule(&self) -> bool {
        self.cron_expression.is_some() || self.is_active.is_some()
    }

    pub fn apply(self, task: &mut ScheduledTask) {
        if let Some(name) = self.name {
            task.name = name;
        }
        if let Some(expr) = self.cron_expression {
            task.cron_expression = expr;
        }
        if let Some(agent) = self.agent_name {
            task.agent_name = agent;
        }
        if let Some(prompt) = self.prompt {
            task.prompt = prompt;
        }
        if let Some(recipients) = self.recipients {
            task.recipients = recipients;
        }
        if let Some(active) = self.is_active {
            task.is_active = active;
        }
    }
}

/// Final write of one execution: status, error and the recomputed next run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Result of one firing, returned by manual runs and logged for scheduled ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOutcome {
    pub task_id: TaskId,
    pub trigger: TriggerKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl RunOutcome {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Summary status of the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub timezone: String,
    pub job_count: usize,
    pub in_flight: usize,
    pub next_fire_at: Option<DateTime<Utc>>,
}
