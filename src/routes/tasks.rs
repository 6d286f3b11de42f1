//! Task CRUD routes
//!
//! Thin collaborators around the task repository. Every write path here
//! stamps `updated_at` through the same repository code the sync engine
//! uses, so direct edits surface in other clients' deltas.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, put},
    Router,
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::{NewTask, Task, TaskFields, TaskFilter, TaskPatch, TaskRepository};
use crate::error::{AppError, Result};
use crate::extract::{Json, Path, Query};
use crate::identity::UserContext;
use crate::state::AppState;

/// Create the tasks router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/:id", put(update_task).delete(delete_task))
        .route("/:id/quadrant", put(move_quadrant))
}

/// List the current user's tasks with optional filters
async fn list_tasks(
    State(state): State<AppState>,
    ctx: UserContext,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<Task>>> {
    let mut conn = state.db().acquire().await?;
    let mut repo = TaskRepository::new(&mut *conn);
    let tasks = repo
        .list(ctx.user_id, &filter, Utc::now().timestamp_millis())
        .await?;
    Ok(Json(tasks))
}

/// Create a task
async fn create_task(
    State(state): State<AppState>,
    ctx: UserContext,
    Json(new): Json<NewTask>,
) -> Result<Json<Task>> {
    let mut conn = state.db().acquire().await?;
    let mut repo = TaskRepository::new(&mut *conn);
    let task = repo
        .insert(ctx.user_id, &new, Utc::now().timestamp_millis())
        .await?;
    Ok(Json(task))
}

/// Partially update a task
async fn update_task(
    State(state): State<AppState>,
    ctx: UserContext,
    Path(id): Path<i64>,
    Json(fields): Json<TaskFields>,
) -> Result<Json<Task>> {
    let mut conn = state.db().acquire().await?;
    let mut repo = TaskRepository::new(&mut *conn);
    let patch = TaskPatch { id, fields };
    let task = repo
        .apply_patch(ctx.user_id, &patch, Utc::now().timestamp_millis())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task not found: {}", id)))?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
struct QuadrantUpdate {
    quadrant: i64,
}

/// Move a task to another quadrant
async fn move_quadrant(
    State(state): State<AppState>,
    ctx: UserContext,
    Path(id): Path<i64>,
    Json(update): Json<QuadrantUpdate>,
) -> Result<Json<Task>> {
    let mut conn = state.db().acquire().await?;
    let mut repo = TaskRepository::new(&mut *conn);
    let patch = TaskPatch {
        id,
        fields: TaskFields {
            quadrant: Some(update.quadrant),
            ..Default::default()
        },
    };
    let task = repo
        .apply_patch(ctx.user_id, &patch, Utc::now().timestamp_millis())
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task not found: {}", id)))?;
    Ok(Json(task))
}

/// Delete a task
async fn delete_task(
    State(state): State<AppState>,
    ctx: UserContext,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    let mut conn = state.db().acquire().await?;
    let mut repo = TaskRepository::new(&mut *conn);
    let deleted = repo.delete(id, ctx.user_id).await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Task not found: {}", id)))
    }
}
