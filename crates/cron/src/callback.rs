//! The work a registered job performs when it fires.

use std::{future::Future, sync::Arc, time::Duration};

use {async_trait::async_trait, thiserror::Error};

use crate::types::TaskId;

/// What a successful execution produced, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub summary: String,
}

impl RunReport {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

/// Why an execution failed. Each variant is persisted as the task's
/// `last_run_error` text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("execution timed out after {}s", .after.as_secs())]
    Timeout { after: Duration },

    #[error("scheduled task {task_id} no longer exists")]
    TaskNotFound { task_id: TaskId },

    #[error("agent '{name}' not found or inactive")]
    AgentNotFound { name: String },

    #[error("agent query failed: {0}")]
    Agent(String),

    #[error("task has no recipients")]
    NoRecipients,

    #[error("mail delivery failed: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("execution panicked: {0}")]
    Panicked(String),
}

impl ExecutionError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::TaskNotFound { .. } => "task_not_found",
            Self::AgentNotFound { .. } => "agent_not_found",
            Self::Agent(_) => "agent",
            Self::NoRecipients => "no_recipients",
            Self::Transport(_) => "transport",
            Self::Store(_) => "store",
            Self::Panicked(_) => "panicked",
        }
    }
}

/// Invoked with the task id each time a job fires.
///
/// Implementations load whatever they need by id; the scheduler bounds the
/// call with its execution timeout and records the result.
#[async_trait]
pub trait TaskCallback: Send + Sync {
    async fn run(&self, task_id: TaskId) -> Result<RunReport, ExecutionError>;
}

/// Adapter turning an async closure into a [`TaskCallback`].
pub struct FnCallback<F>(F);

#[async_trait]
impl<F, Fut> TaskCallback for FnCallback<F>
where
    F: Fn(TaskId) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RunReport, ExecutionError>> + Send + 'static,
{
    async fn run(&self, task_id: TaskId) -> Result<RunReport, ExecutionError> {
        (self.0)(task_id).await
    }
}

pub fn callback_fn<F, Fut>(f: F) -> Arc<dyn TaskCallback>
where
    F: Fn(TaskId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RunReport, ExecutionError>> + Send + 'static,
{
    Arc::new(FnCallback(f))
}
