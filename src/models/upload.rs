//! Upload input and response shapes for `/api/files`.

use bytes::Bytes;
use serde::Serialize;
use utoipa::ToSchema;

/// A file received from a multipart upload.
#[derive(Clone, Debug)]
pub struct UploadFile {
    /// File name supplied by the client, used only for its extension.
    pub file_name: Option<String>,

    /// MIME type declared by the client.
    pub content_type: Option<String>,

    pub data: Bytes,
}

/// JSON body returned by a successful upload.
#[derive(Serialize, Debug, ToSchema)]
pub struct UploadResponse {
    pub url: String,
    pub message: String,
}

/// Multipart form accepted by the upload route; documentation only.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}
