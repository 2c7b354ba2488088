use thiserror::Error;

use crate::types::TaskId;

/// A cron expression that cannot be turned into a schedule.
///
/// Reported synchronously to whoever supplied the expression; a task whose
/// expression fails here is never registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid cron expression '{expression}': {reason}")]
pub struct ScheduleFormatError {
    pub expression: String,
    pub reason: String,
}

impl ScheduleFormatError {
    #[must_use]
    pub fn new(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    ScheduleFormat(#[from] ScheduleFormatError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    #[error("invalid task: {reason}")]
    InvalidTask { reason: String },

    #[error("scheduled task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    #[error("scheduled task {task_id} is already running")]
    AlreadyRunning { task_id: TaskId },

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_task(reason: impl Into<String>) -> Self {
        Self::InvalidTask {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn task_not_found(task_id: TaskId) -> Self {
        Self::TaskNotFound { task_id }
    }

    #[must_use]
    pub fn unknown_timezone(timezone: impl Into<String>) -> Self {
        Self::UnknownTimezone {
            timezone: timezone.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
