//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the task database and the object store

use crate::routes::routes::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness check — always returns 200 OK with a plain JSON body.
/// This endpoint should be cheap and never perform I/O.
#[utoipa::path(
    get,
    path = "/healthz",
    responses((status = 200, description = "Service is alive"))
)]
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness check that runs, concurrently:
/// 1. A lightweight query against SQLite (`SELECT 1`).
/// 2. A container existence check against the object store.
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
#[utoipa::path(
    get,
    path = "/readyz",
    responses(
        (status = 200, description = "Database and container reachable"),
        (status = 503, description = "A dependency check failed")
    )
)]
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let sqlite = async {
        match sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*state.tasks.db)
            .await
        {
            Ok(1) => CheckStatus::ok(),
            Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
            Err(e) => CheckStatus::failed(format!("error: {}", e)),
        }
    };
    let store = async {
        let store = state.blobs.store();
        match store.container_exists().await {
            Ok(true) => CheckStatus::ok(),
            Ok(false) => CheckStatus::failed(format!("container `{}` is missing", store.container())),
            Err(e) => CheckStatus::failed(format!("error: {}", e)),
        }
    };
    let (sqlite_check, store_check) = futures::future::join(sqlite, store).await;

    let overall_ok = sqlite_check.ok && store_check.ok;
    let mut checks = HashMap::new();
    checks.insert("sqlite", sqlite_check);
    checks.insert("object_store", store_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
