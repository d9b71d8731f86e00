//! HTTP handlers for image upload and retrieval under `/api/files`.
//!
//! Uploads report failures as JSON; both retrieval routes answer any failure
//! with an empty `404`.

use crate::{
    errors::{AppError, ErrorBody},
    models::upload::{UploadFile, UploadForm, UploadResponse},
    services::{blob_service::BlobService, media_type::media_type_for},
};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct ByUrlQuery {
    pub url: Option<String>,
}

/// POST `/api/files/upload` — store the `file` field and return its URL.
#[utoipa::path(
    post,
    path = "/api/files/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Missing, empty or unnamed file", body = ErrorBody),
        (status = 500, description = "Blob storage failure", body = ErrorBody)
    )
)]
pub async fn upload_image(
    State(service): State<BlobService>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|err| AppError::new(err.status(), err.body_text()))?;
        file = Some(UploadFile {
            file_name,
            content_type,
            data,
        });
        break;
    }

    let url = service.upload_image(file).await?;
    Ok(Json(UploadResponse {
        url,
        message: "Image uploaded successfully".into(),
    }))
}

/// GET `/api/files/{file_name}` — object bytes by exact name.
#[utoipa::path(
    get,
    path = "/api/files/{file_name}",
    params(("file_name" = String, Path, description = "Object name in the container")),
    responses(
        (status = 200, description = "Image bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Unknown name or storage failure")
    )
)]
pub async fn get_image(
    State(service): State<BlobService>,
    Path(file_name): Path<String>,
) -> Response {
    match service.get_image(&file_name).await {
        Ok(data) => image_response(data, media_type_for(&file_name)),
        Err(err) => {
            debug!("get image `{}` failed: {}", file_name, err);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// GET `/api/files/by-url?url=...` — object bytes by a previously issued URL.
#[utoipa::path(
    get,
    path = "/api/files/by-url",
    params(("url" = Option<String>, Query, description = "URL returned by an upload")),
    responses(
        (status = 200, description = "Image bytes", content_type = "application/octet-stream"),
        (status = 404, description = "Missing, foreign or unknown URL, or storage failure")
    )
)]
pub async fn get_image_by_url(
    State(service): State<BlobService>,
    Query(query): Query<ByUrlQuery>,
) -> Response {
    let Some(url) = query.url else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match service.get_image_by_url(&url).await {
        Ok((name, data)) => image_response(data, media_type_for(name)),
        Err(err) => {
            debug!("get image by url `{}` failed: {}", url, err);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

fn image_response(data: Bytes, media_type: &'static str) -> Response {
    let mut response = Response::new(Body::from(data));
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(media_type));
    response
}

#[cfg(test)]
mod tests {
    use crate::{routes::routes::tests::test_app, store::memory::MemoryObjectStore};
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
        response::Response,
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-IMAGE-STORE-BOUNDARY";

    fn multipart_request(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/files/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(res: Response) -> Vec<u8> {
        res.into_body().collect().await.unwrap().to_bytes().to_vec()
    }

    async fn json_body(res: Response) -> Value {
        serde_json::from_slice(&body_bytes(res).await).unwrap()
    }

    async fn upload(app: &Router, file_name: &str, data: &[u8]) -> String {
        let res = app
            .clone()
            .oneshot(multipart_request("file", file_name, "image/png", data))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["message"], "Image uploaded successfully");
        body["url"].as_str().unwrap().to_string()
    }

    fn encode_query(value: &str) -> String {
        value
            .bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' => {
                    (b as char).to_string()
                }
                other => format!("%{:02X}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn upload_then_fetch_by_url() {
        let (app, _) = test_app(MemoryObjectStore::new("images")).await;
        let url = upload(&app, "photo.png", b"0123456789").await;
        assert!(url.ends_with(".png"));

        let res = app
            .clone()
            .oneshot(get(&format!("/api/files/by-url?url={}", encode_query(&url))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(body_bytes(res).await, b"0123456789");
    }

    #[tokio::test]
    async fn by_url_content_type_ignores_query_string() {
        let (app, store) = test_app(MemoryObjectStore::new("images")).await;
        let url = upload(&app, "scan.jpeg", b"jpeg bytes").await;
        let signed = format!("{}?sv=2023-11-03&sig=abc%2Fdef", url);

        let res = app
            .clone()
            .oneshot(get(&format!("/api/files/by-url?url={}", encode_query(&signed))))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(body_bytes(res).await, b"jpeg bytes");
        // One existence check and one read.
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn upload_then_fetch_by_name() {
        let (app, _) = test_app(MemoryObjectStore::new("images")).await;
        let url = upload(&app, "holiday.JPG", b"jpeg bytes").await;
        let name = url.rsplit('/').next().unwrap();

        let res = app
            .clone()
            .oneshot(get(&format!("/api/files/{}", name)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(body_bytes(res).await, b"jpeg bytes");
    }

    #[tokio::test]
    async fn upload_failures_are_json_errors() {
        let (app, store) = test_app(MemoryObjectStore::new("images")).await;

        let res = app
            .clone()
            .oneshot(multipart_request("file", "empty.png", "image/png", b""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "File cannot be null or empty");

        let res = app
            .clone()
            .oneshot(multipart_request("attachment", "a.png", "image/png", b"data"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app
            .clone()
            .oneshot(multipart_request("file", "README", "text/plain", b"data"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["status"], 400);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn retrieval_failures_are_empty_not_found() {
        let (app, store) = test_app(MemoryObjectStore::new("images")).await;
        let foreign = "https://testaccount.blob.core.windows.net/wrong-container/a.png";

        for uri in [
            "/api/files/nonexistent-name.png".to_string(),
            "/api/files/by-url".to_string(),
            format!("/api/files/by-url?url={}", encode_query(foreign)),
            format!(
                "/api/files/by-url?url={}",
                encode_query("https://elsewhere.example/images/a.png")
            ),
        ] {
            let res = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(res.status(), StatusCode::NOT_FOUND, "{uri}");
            assert!(body_bytes(res).await.is_empty(), "{uri}");
        }
        // Only the by-name lookup reached the store.
        assert_eq!(store.reads(), 1);
    }
}
