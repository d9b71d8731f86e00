//! HTTP handlers for `/api/tasks`.

use crate::{
    errors::{AppError, ErrorBody},
    models::task::{Task, TaskInput},
    services::task_service::TaskService,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

#[utoipa::path(
    get,
    path = "/api/tasks",
    responses((status = 200, description = "All tasks", body = [Task]))
)]
pub async fn list_tasks(State(service): State<TaskService>) -> Result<Json<Vec<Task>>, AppError> {
    Ok(Json(service.list().await?))
}

#[utoipa::path(
    get,
    path = "/api/tasks/{id}",
    params(("id" = i64, Path, description = "Task identifier")),
    responses(
        (status = 200, description = "Task details", body = Task),
        (status = 404, description = "Task not found", body = ErrorBody)
    )
)]
pub async fn get_task(
    State(service): State<TaskService>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(service.get(id).await?))
}

#[utoipa::path(
    post,
    path = "/api/tasks",
    request_body = TaskInput,
    responses(
        (status = 201, description = "Task created", body = Task),
        (status = 400, description = "Blank title or status", body = ErrorBody)
    )
)]
pub async fn create_task(
    State(service): State<TaskService>,
    Json(input): Json<TaskInput>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[utoipa::path(
    put,
    path = "/api/tasks/{id}",
    params(("id" = i64, Path, description = "Task identifier")),
    request_body = TaskInput,
    responses(
        (status = 200, description = "Task updated", body = Task),
        (status = 400, description = "Blank title or status", body = ErrorBody),
        (status = 404, description = "Task not found", body = ErrorBody)
    )
)]
pub async fn update_task(
    State(service): State<TaskService>,
    Path(id): Path<i64>,
    Json(input): Json<TaskInput>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(service.update(id, input).await?))
}

#[utoipa::path(
    delete,
    path = "/api/tasks/{id}",
    params(("id" = i64, Path, description = "Task identifier")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "Task not found", body = ErrorBody)
    )
)]
pub async fn delete_task(
    State(service): State<TaskService>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH `/api/tasks/{id}/complete`
#[utoipa::path(
    patch,
    path = "/api/tasks/{id}/complete",
    params(("id" = i64, Path, description = "Task identifier")),
    responses(
        (status = 200, description = "Task marked completed", body = Task),
        (status = 404, description = "Task not found", body = ErrorBody)
    )
)]
pub async fn complete_task(
    State(service): State<TaskService>,
    Path(id): Path<i64>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(service.mark_completed(id).await?))
}
