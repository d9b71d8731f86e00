//! BlobService — uploads images into the configured container and resolves
//! object names or previously issued object URLs back to their bytes.
//!
//! Object names are `<uuid-v4>.<extension>` and object URLs are
//! `<account-url>/<container>/<object-name>`. Every URL produced by
//! [`BlobService::upload_image`] is accepted by [`BlobService::get_image_by_url`].

use crate::{
    config::StorageConfig,
    models::upload::UploadFile,
    services::media_type::media_type_for,
    store::{ObjectStore, StoreError},
};
use bytes::Bytes;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Closed set of failure kinds the HTTP layer maps onto status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobErrorKind {
    InvalidArgument,
    NotFound,
    StorageFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageOp {
    Upload,
    Download,
}

impl fmt::Display for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageOp::Upload => write!(f, "upload file to"),
            StorageOp::Download => write!(f, "download file from"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("file `{name}` not found in container `{container}`")]
    NotFound { container: String, name: String },
    #[error("failed to {op} blob storage: {source}")]
    Storage {
        op: StorageOp,
        #[source]
        source: StoreError,
    },
}

impl BlobError {
    fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn kind(&self) -> BlobErrorKind {
        match self {
            BlobError::InvalidArgument(_) => BlobErrorKind::InvalidArgument,
            BlobError::NotFound { .. } => BlobErrorKind::NotFound,
            BlobError::Storage { .. } => BlobErrorKind::StorageFailure,
        }
    }
}

pub type BlobResult<T> = Result<T, BlobError>;

#[derive(Clone)]
pub struct BlobService {
    store: Arc<dyn ObjectStore>,
    account_url: String,
    container: String,
}

impl BlobService {
    pub fn new(config: &StorageConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            account_url: config.account_url(),
            container: config.container_name.clone(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Deterministic URL of an object in the configured container.
    pub fn object_url(&self, name: &str) -> String {
        format!("{}/{}/{}", self.account_url, self.container, name)
    }

    /// Store an uploaded image under a fresh name and return its URL.
    ///
    /// The upload is rejected before any write when the file is missing,
    /// empty, or its name carries no usable extension.
    pub async fn upload_image(&self, file: Option<UploadFile>) -> BlobResult<String> {
        let file = match file {
            Some(file) if !file.data.is_empty() => file,
            _ => return Err(BlobError::invalid("File cannot be null or empty")),
        };
        let original = file.file_name.as_deref().unwrap_or_default();
        let extension = file_extension(original).ok_or_else(|| {
            BlobError::invalid(format!("File name `{}` has no usable extension", original))
        })?;

        let name = format!("{}.{}", Uuid::new_v4(), extension);
        let content_type = file
            .content_type
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| media_type_for(original))
            .to_string();
        let size = file.data.len();

        let upload_err = |source| BlobError::Storage {
            op: StorageOp::Upload,
            source,
        };
        self.store
            .write_object(&name, file.data)
            .await
            .map_err(upload_err)?;
        self.store
            .set_content_type(&name, &content_type)
            .await
            .map_err(upload_err)?;

        debug!(
            "stored {} ({} bytes, {}) in container {}",
            name, size, content_type, self.container
        );
        Ok(self.object_url(&name))
    }

    /// Read an object by its exact name.
    pub async fn get_image(&self, file_name: &str) -> BlobResult<Bytes> {
        if file_name.is_empty() {
            return Err(BlobError::invalid("File name cannot be null or empty"));
        }
        self.download(file_name).await
    }

    /// Read an object by a URL previously returned from an upload.
    ///
    /// The URL must start with the configured account URL and address the
    /// configured container; nothing is fetched otherwise.
    ///
    /// Returns the resolved object name along with the bytes.
    pub async fn get_image_by_url<'a>(&self, url: &'a str) -> BlobResult<(&'a str, Bytes)> {
        let name = self.resolve_url(url)?;
        let data = self.download(name).await?;
        Ok((name, data))
    }

    /// Validate `url` and return the object name it addresses.
    pub fn resolve_url<'a>(&self, url: &'a str) -> BlobResult<&'a str> {
        if url.is_empty() {
            return Err(BlobError::invalid("File URL cannot be null or empty"));
        }
        let rest = url
            .strip_prefix(self.account_url.as_str())
            .ok_or_else(|| BlobError::invalid("File URL is not valid"))?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return Err(BlobError::invalid("File URL is not valid"));
        }
        let path = rest.strip_prefix('/').unwrap_or(rest);
        // SAS tokens and fragments are not part of the object name.
        let path = path.split(['?', '#']).next().unwrap_or_default();

        let (container, name) = path
            .split_once('/')
            .filter(|(_, name)| !name.is_empty())
            .ok_or_else(|| BlobError::invalid("Invalid blob URL format"))?;
        if container != self.container {
            return Err(BlobError::invalid(
                "URL container does not match the configured container",
            ));
        }
        if name.contains('/') {
            return Err(BlobError::invalid("Invalid blob URL format"));
        }
        Ok(name)
    }

    async fn download(&self, name: &str) -> BlobResult<Bytes> {
        let download_err = |source| BlobError::Storage {
            op: StorageOp::Download,
            source,
        };
        let not_found = || BlobError::NotFound {
            container: self.container.clone(),
            name: name.to_string(),
        };

        if !self.store.object_exists(name).await.map_err(|err| match err {
            StoreError::InvalidName(reason) => BlobError::InvalidArgument(reason),
            other => download_err(other),
        })? {
            return Err(not_found());
        }

        match self.store.read_object(name).await {
            Ok(data) => {
                debug!("read {} ({} bytes) from container {}", name, data.len(), self.container);
                Ok(data)
            }
            // Deleted between the existence check and the read.
            Err(StoreError::NotFound(_)) => Err(not_found()),
            Err(err) => Err(download_err(err)),
        }
    }
}

/// Extension of the final path component of `file_name`, if it is a
/// non-empty run of ASCII letters and digits.
fn file_extension(file_name: &str) -> Option<&str> {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (_, extension) = base.rsplit_once('.')?;
    if extension.is_empty() || !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some(extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreResult, memory::MemoryObjectStore};

    const ACCOUNT_URL: &str = "https://testaccount.blob.core.windows.net";

    fn service() -> (BlobService, MemoryObjectStore) {
        let config = StorageConfig {
            account_name: "testaccount".into(),
            account_key: None,
            container_name: "images".into(),
            endpoint: None,
        };
        let store = MemoryObjectStore::new("images");
        (BlobService::new(&config, Arc::new(store.clone())), store)
    }

    fn file(name: &str, content_type: Option<&str>, data: &'static [u8]) -> UploadFile {
        UploadFile {
            file_name: Some(name.to_string()),
            content_type: content_type.map(str::to_string),
            data: Bytes::from_static(data),
        }
    }

    fn name_of(url: &str) -> &str {
        url.rsplit('/').next().unwrap()
    }

    #[tokio::test]
    async fn upload_then_fetch_by_url_and_name() {
        let (service, store) = service();
        let payload = b"0123456789";
        let url = service
            .upload_image(Some(file("photo.png", Some("image/png"), payload)))
            .await
            .unwrap();

        assert!(url.starts_with(&format!("{}/images/", ACCOUNT_URL)));
        assert!(url.ends_with(".png"));
        let name = name_of(&url);
        assert!(Uuid::parse_str(name.trim_end_matches(".png")).is_ok());

        let (resolved, by_url) = service.get_image_by_url(&url).await.unwrap();
        assert_eq!(resolved, name);
        let by_name = service.get_image(name).await.unwrap();
        assert_eq!(&by_url[..], payload);
        assert_eq!(by_url, by_name);

        let stored = store.get(name).await.unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("image/png"));
        assert_eq!(media_type_for(&url), "image/png");
    }

    #[tokio::test]
    async fn every_upload_gets_a_fresh_name() {
        let (service, store) = service();
        let first = service
            .upload_image(Some(file("a.jpg", None, b"same")))
            .await
            .unwrap();
        let second = service
            .upload_image(Some(file("a.jpg", None, b"same")))
            .await
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn missing_content_type_is_inferred_from_name() {
        let (service, store) = service();
        let url = service
            .upload_image(Some(file("C:\\pics\\Logo.SVG", None, b"<svg/>")))
            .await
            .unwrap();
        assert!(url.ends_with(".SVG"));
        let stored = store.get(name_of(&url)).await.unwrap();
        assert_eq!(stored.content_type.as_deref(), Some("image/svg+xml"));
    }

    #[tokio::test]
    async fn rejects_missing_or_empty_files_without_writing() {
        let (service, store) = service();
        let err = service.upload_image(None).await.unwrap_err();
        assert_eq!(err.kind(), BlobErrorKind::InvalidArgument);

        let err = service
            .upload_image(Some(file("empty.png", Some("image/png"), b"")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), BlobErrorKind::InvalidArgument);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn rejects_names_without_extension() {
        let (service, store) = service();
        for name in ["noextension", "trailing.", "dir.v2/readme", "a.p?g"] {
            let err = service
                .upload_image(Some(file(name, None, b"data")))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), BlobErrorKind::InvalidArgument, "{name}");
        }
        let unnamed = UploadFile {
            file_name: None,
            content_type: None,
            data: Bytes::from_static(b"data"),
        };
        let err = service.upload_image(Some(unnamed)).await.unwrap_err();
        assert_eq!(err.kind(), BlobErrorKind::InvalidArgument);
        assert_eq!(store.writes(), 0);
    }

    #[tokio::test]
    async fn get_image_reports_invalid_and_missing_names() {
        let (service, _) = service();
        assert_eq!(
            service.get_image("").await.unwrap_err().kind(),
            BlobErrorKind::InvalidArgument
        );
        let err = service.get_image("nonexistent-name.png").await.unwrap_err();
        assert_eq!(err.kind(), BlobErrorKind::NotFound);
        assert_eq!(
            err.to_string(),
            "file `nonexistent-name.png` not found in container `images`"
        );
    }

    #[tokio::test]
    async fn foreign_urls_are_rejected_before_any_read() {
        let (service, store) = service();
        let cases = [
            "",
            "https://otheraccount.blob.core.windows.net/images/a.png",
            "https://testaccount.blob.core.windows.net.evil.example/images/a.png",
            "https://testaccount.blob.core.windows.net/wrong-container/a.png",
            "https://testaccount.blob.core.windows.net/images",
            "https://testaccount.blob.core.windows.net/images/",
            "https://testaccount.blob.core.windows.net/images/nested/a.png",
        ];
        for url in cases {
            let err = service.get_image_by_url(url).await.unwrap_err();
            assert_eq!(err.kind(), BlobErrorKind::InvalidArgument, "{url}");
        }
        assert_eq!(store.reads(), 0);
    }

    #[tokio::test]
    async fn container_mismatch_has_its_own_message() {
        let (service, _) = service();
        let err = service
            .get_image_by_url(&format!("{}/wrong-container/a.png", ACCOUNT_URL))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "URL container does not match the configured container"
        );
    }

    #[tokio::test]
    async fn resolves_urls_with_query_strings() {
        let (service, _) = service();
        assert_eq!(
            service
                .resolve_url(&format!("{}/images/a.png?sv=2023&sig=abc", ACCOUNT_URL))
                .unwrap(),
            "a.png"
        );
        let err = service
            .get_image_by_url(&format!("{}/images/missing.png", ACCOUNT_URL))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), BlobErrorKind::NotFound);
    }

    #[tokio::test]
    async fn storage_failures_wrap_the_cause() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            account_name: "testaccount".into(),
            account_key: None,
            container_name: "images".into(),
            endpoint: None,
        };
        // Container root is a regular file, so every write fails.
        std::fs::write(dir.path().join("images"), b"not a directory").unwrap();
        let store = crate::store::local::LocalObjectStore::new(dir.path(), "images");
        let service = BlobService::new(&config, Arc::new(store));

        let err = service
            .upload_image(Some(file("photo.png", None, b"bytes")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), BlobErrorKind::StorageFailure);
        assert!(err.to_string().starts_with("failed to upload file to blob storage"));
        assert!(std::error::Error::source(&err).is_some());
    }

    /// Store whose existence check or read fails with a transport error.
    struct BrokenStore {
        fail_exists: bool,
    }

    #[async_trait::async_trait]
    impl ObjectStore for BrokenStore {
        fn container(&self) -> &str {
            "images"
        }

        async fn container_exists(&self) -> StoreResult<bool> {
            Ok(true)
        }

        async fn create_container(&self) -> StoreResult<()> {
            Ok(())
        }

        async fn object_exists(&self, _name: &str) -> StoreResult<bool> {
            if self.fail_exists {
                return Err(StoreError::Status {
                    operation: "blob exists",
                    status: 503,
                    body: String::new(),
                });
            }
            Ok(true)
        }

        async fn write_object(&self, _name: &str, _data: Bytes) -> StoreResult<()> {
            Ok(())
        }

        async fn set_content_type(&self, _name: &str, _content_type: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn read_object(&self, _name: &str) -> StoreResult<Bytes> {
            Err(StoreError::Io(std::io::Error::other("connection reset")))
        }
    }

    #[tokio::test]
    async fn download_failures_are_storage_failures_not_missing_files() {
        let config = StorageConfig {
            account_name: "testaccount".into(),
            account_key: None,
            container_name: "images".into(),
            endpoint: None,
        };
        let url = format!("{}/images/a.png", ACCOUNT_URL);

        for fail_exists in [true, false] {
            let service = BlobService::new(&config, Arc::new(BrokenStore { fail_exists }));
            let by_name = service.get_image("a.png").await.unwrap_err();
            let by_url = service.get_image_by_url(&url).await.unwrap_err();

            for err in [by_name, by_url] {
                assert_eq!(err.kind(), BlobErrorKind::StorageFailure, "{err}");
                assert!(
                    err.to_string()
                        .starts_with("failed to download file from blob storage"),
                    "{err}"
                );
                assert!(std::error::Error::source(&err).is_some());
            }
        }
    }
}
