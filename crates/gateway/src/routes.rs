use {
    agentdesk_cron::types::{ScheduledTask, TaskCreate, TaskId, TaskPatch},
    axum::{
        Json, Router,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
        routing::{get, post, put},
    },
    tracing::info,
};

use crate::{error::ApiError, state::AppState};

type ApiResult<T> = Result<T, ApiError>;

/// Routes mounted under `/api/admin`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/schedules/{id}",
            put(update_schedule).delete(delete_schedule),
        )
        .route("/schedules/{id}/test", post(test_schedule))
        .route("/scheduler", get(scheduler_status))
}

async fn list_schedules(State(state): State<AppState>) -> ApiResult<Json<Vec<ScheduledTask>>> {
    Ok(Json(state.scheduler.list_tasks().await?))
}

async fn create_schedule(
    State(state): State<AppState>,
    Json(create): Json<TaskCreate>,
) -> ApiResult<impl IntoResponse> {
    let task = state.scheduler.create_task(create).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
    Json(patch): Json<TaskPatch>,
) -> ApiResult<Json<ScheduledTask>> {
    Ok(Json(state.scheduler.update_task(id, patch).await?))
}

async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<serde_json::Value>> {
    state.scheduler.delete_task(id).await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// Run a task now and report how it went. The run is recorded like any
/// scheduled one.
async fn test_schedule(
    State(state): State<AppState>,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<serde_json::Value>> {
    info!(task_id = id, "manual run requested");
    let outcome = state.scheduler.run_now(id).await?;
    Ok(Json(serde_json::json!({
        "task_id": outcome.task_id,
        "trigger": outcome.trigger,
        "status": outcome.status,
        "error": outcome.error,
        "started_at": outcome.started_at,
        "finished_at": outcome.finished_at,
        "duration_ms": outcome.duration_ms(),
        "next_run_at": outcome.next_run_at,
    })))
}

async fn scheduler_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.scheduler.status();
    Json(serde_json::json!({
        "running": status.running,
        "timezone": status.timezone,
        "job_count": status.job_count,
        "in_flight": status.in_flight,
        "next_fire_at": status.next_fire_at,
        "jobs": state.scheduler.jobs(),
    }))
}
