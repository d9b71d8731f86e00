//! OpenAPI description of the HTTP surface, served at `/api-docs/openapi.json`.

use crate::{
    errors::ErrorBody,
    handlers::{file_handlers, health_handlers, task_handlers},
    models::{
        task::{Task, TaskInput},
        upload::{UploadForm, UploadResponse},
    },
};
use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "File Management API",
        version = "1.0",
        description = "This API exposes endpoints to manage files in Azure Blob Storage.",
        contact(name = "Mongs", email = "mongsdev@gmail.com"),
        license(
            name = "Apache License, Version 2.0",
            url = "https://www.apache.org/licenses/LICENSE-2.0"
        )
    ),
    servers((url = "/", description = "Server URL in Development environment")),
    paths(
        health_handlers::healthz,
        health_handlers::readyz,
        file_handlers::upload_image,
        file_handlers::get_image_by_url,
        file_handlers::get_image,
        task_handlers::list_tasks,
        task_handlers::create_task,
        task_handlers::get_task,
        task_handlers::update_task,
        task_handlers::delete_task,
        task_handlers::complete_task
    ),
    components(schemas(Task, TaskInput, UploadForm, UploadResponse, ErrorBody))
)]
pub struct ApiDoc;

/// GET `/api-docs/openapi.json`
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
