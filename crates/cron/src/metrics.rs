//! Scheduler metric names, recorded through the `metrics` facade when the
//! `metrics` feature is enabled.

/// Number of registered jobs
pub const JOBS_SCHEDULED: &str = "agentdesk_scheduler_jobs_scheduled";
/// Executions currently in flight
pub const EXECUTIONS_IN_FLIGHT: &str = "agentdesk_scheduler_executions_in_flight";
/// Total executions, labelled by trigger kind
pub const EXECUTIONS_TOTAL: &str = "agentdesk_scheduler_executions_total";
/// Execution duration in seconds
pub const EXECUTION_DURATION_SECONDS: &str = "agentdesk_scheduler_execution_duration_seconds";
/// Failed executions, labelled by error kind
pub const ERRORS_TOTAL: &str = "agentdesk_scheduler_errors_total";
/// Fires skipped because the previous run was still going
pub const OVERLAPS_SKIPPED_TOTAL: &str = "agentdesk_scheduler_overlaps_skipped_total";
/// Missed fires dropped outside the grace window
pub const MISFIRES_DROPPED_TOTAL: &str = "agentdesk_scheduler_misfires_dropped_total";
/// Delay between a fire time and the execution start, in seconds
pub const FIRE_LATENCY_SECONDS: &str = "agentdesk_scheduler_fire_latency_seconds";

/// Label key for trigger kind
pub const TRIGGER: &str = "trigger";
/// Label key for error kind
pub const ERROR: &str = "error";
