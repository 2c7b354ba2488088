//! Cron-style scheduling of report tasks.
//!
//! Parses five-field cron expressions (with `#n` nth-weekday support),
//! computes fire times in a configured timezone, keeps a registry of live
//! jobs and drives their execution with at-most-one-run-per-task, misfire
//! grace and durable run bookkeeping.

pub mod callback;
pub mod error;
pub mod expr;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod registry;
pub mod service;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod trigger;
pub mod types;

pub use {
    callback::{ExecutionError, RunReport, TaskCallback, callback_fn},
    error::{Error, Result, ScheduleFormatError},
    expr::{ScheduleDescriptor, parse_schedule, parse_timezone},
    service::{Scheduler, SchedulerOptions},
    trigger::{next_fire_after, upcoming},
};

/// Run database migrations for the task store.
///
/// Creates the `scheduled_tasks` table. Call at startup when sharing a pool
/// with [`store_sqlite::SqliteTaskStore::with_pool`].
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
