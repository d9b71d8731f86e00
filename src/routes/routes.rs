//! Defines routes for the image and task APIs.
//!
//! ## Structure
//! - **Image endpoints**
//!   - `POST   /api/files/upload`       — multipart upload, field `file`
//!   - `GET    /api/files/by-url?url=`  — download by a previously issued URL
//!   - `GET    /api/files/{file_name}`  — download by object name
//!
//! - **Task endpoints**
//!   - `GET    /api/tasks`              — list tasks
//!   - `POST   /api/tasks`              — create task
//!   - `GET    /api/tasks/{id}`         — fetch task
//!   - `PUT    /api/tasks/{id}`         — replace task fields
//!   - `DELETE /api/tasks/{id}`         — delete task
//!   - `PATCH  /api/tasks/{id}/complete` — mark task completed
//!
//! - **Docs**
//!   - `GET    /api-docs/openapi.json`  — OpenAPI document

use crate::{
    handlers::{
        file_handlers::{get_image, get_image_by_url, upload_image},
        health_handlers::{healthz, readyz},
        task_handlers::{
            complete_task, create_task, delete_task, get_task, list_tasks, update_task,
        },
    },
    routes::docs::openapi_json,
    services::{blob_service::BlobService, task_service::TaskService},
};
use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub blobs: BlobService,
    pub tasks: TaskService,
}

impl FromRef<AppState> for BlobService {
    fn from_ref(state: &AppState) -> Self {
        state.blobs.clone()
    }
}

impl FromRef<AppState> for TaskService {
    fn from_ref(state: &AppState) -> Self {
        state.tasks.clone()
    }
}

/// Build the router for all routes.
///
/// `max_upload_bytes` caps the request body accepted by the upload route.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    let files = Router::new()
        .route(
            "/upload",
            post(upload_image).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/by-url", get(get_image_by_url))
        .route("/{file_name}", get(get_image));

    let tasks = Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route(
            "/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/{id}/complete", patch(complete_task));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/files", files)
        .nest("/api/tasks", tasks)
        .layer(TraceLayer::new_for_http())
}
