//! Object store clients.
//!
//! Every client addresses exactly one container, fixed at construction. The
//! blob service only talks to the remote side through [`ObjectStore`], so the
//! Azure, local-disk and in-memory clients are interchangeable.

pub mod azure;
pub mod local;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("object name `{0}` is not valid for this store")]
    InvalidName(String),
    #[error("storage credentials rejected: {0}")]
    Credentials(String),
    #[error("remote store answered {status} during {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Remote operations against a single container.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the container this client is bound to.
    fn container(&self) -> &str;

    async fn container_exists(&self) -> StoreResult<bool>;

    async fn create_container(&self) -> StoreResult<()>;

    async fn object_exists(&self, name: &str) -> StoreResult<bool>;

    /// Write `data` under `name`, replacing any existing object.
    async fn write_object(&self, name: &str, data: Bytes) -> StoreResult<()>;

    /// Set the content-type metadata of an already written object.
    async fn set_content_type(&self, name: &str, content_type: &str) -> StoreResult<()>;

    async fn read_object(&self, name: &str) -> StoreResult<Bytes>;
}

/// Create the container when it is missing. Called once at start-up.
pub async fn ensure_container(store: &dyn ObjectStore) -> StoreResult<bool> {
    if store.container_exists().await? {
        return Ok(false);
    }
    store.create_container().await?;
    tracing::info!("Created container `{}`", store.container());
    Ok(true)
}
